//! Record validation gate.
//!
//! `validate` checks one decoded candidate against a `SourceSchema` and
//! either returns a normalized `MarketRecord` or the first `SchemaError`
//! found. Validation is all-or-nothing per record; `partition` applies it
//! across a whole response and keeps the survivors.

use super::schema::{
    FieldKind, FieldSpec, SchemaError, SchemaErrorKind, SourceSchema, TimestampFormat,
    TimestampSpec, RECORD_FIELD,
};
use crate::domain::{DroppedRecord, FieldValue, MarketRecord};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Field values that already passed their schema checks, keyed by JSON name.
#[derive(Debug, Default, Clone)]
pub struct ValidatedFields {
    values: HashMap<&'static str, FieldValue>,
}

impl ValidatedFields {
    fn insert(&mut self, name: &'static str, value: FieldValue) {
        self.values.insert(name, value);
    }

    pub fn number(&self, name: &str) -> Result<f64, SchemaError> {
        self.optional_number(name)
            .ok_or_else(|| SchemaError::missing(name))
    }

    pub fn optional_number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Result<String, SchemaError> {
        match self.values.get(name) {
            Some(FieldValue::Text(s)) => Ok(s.clone()),
            _ => Err(SchemaError::missing(name)),
        }
    }
}

/// Validate one candidate record.
///
/// `observed_at` is used as the record timestamp when the candidate does not
/// carry its own.
pub fn validate(
    raw: &Value,
    schema: &SourceSchema,
    observed_at: DateTime<Utc>,
) -> Result<MarketRecord, SchemaError> {
    let obj = raw.as_object().ok_or_else(|| {
        SchemaError::new(
            SchemaErrorKind::TypeMismatch,
            RECORD_FIELD,
            format!("expected object, got {}", json_kind(raw)),
        )
    })?;

    let symbol = normalize_symbol(obj, schema.symbol_key)?;

    let mut values = ValidatedFields::default();
    for spec in schema.fields {
        if let Some(value) = check_field(obj, spec)? {
            values.insert(spec.name, value);
        }
    }

    let timestamp = match &schema.timestamp {
        Some(spec) => parse_timestamp(obj, spec)?.unwrap_or(observed_at),
        None => observed_at,
    };

    let fields = (schema.build)(&values)?;
    Ok(MarketRecord::new(symbol, timestamp, fields))
}

/// Validate every candidate, splitting survivors from dropped records.
///
/// Order of survivors follows the order of the candidates.
pub fn partition(
    candidates: &[Value],
    schema: &SourceSchema,
    observed_at: DateTime<Utc>,
) -> (Vec<MarketRecord>, Vec<DroppedRecord>) {
    let mut records = Vec::with_capacity(candidates.len());
    let mut dropped = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        match validate(candidate, schema, observed_at) {
            Ok(record) => records.push(record),
            Err(error) => {
                let symbol = candidate
                    .get(schema.symbol_key)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                tracing::debug!(
                    source = %schema.source,
                    index,
                    symbol = symbol.as_deref().unwrap_or("?"),
                    %error,
                    "dropping invalid record"
                );
                dropped.push(DroppedRecord {
                    index,
                    symbol,
                    error,
                });
            }
        }
    }

    (records, dropped)
}

fn normalize_symbol(obj: &Map<String, Value>, key: &str) -> Result<String, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(SchemaError::missing(key)),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Err(SchemaError::missing(key))
            } else {
                Ok(s.to_ascii_uppercase())
            }
        }
        Some(other) => Err(type_mismatch(key, "string", other)),
    }
}

fn check_field(obj: &Map<String, Value>, spec: &FieldSpec) -> Result<Option<FieldValue>, SchemaError> {
    let value = match obj.get(spec.name) {
        None | Some(Value::Null) if spec.required => return Err(SchemaError::missing(spec.name)),
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    match spec.kind {
        FieldKind::Number => {
            let n = value
                .as_f64()
                .ok_or_else(|| type_mismatch(spec.name, "number", value))?;
            if let Some(range) = spec.range {
                if !range.contains(n) {
                    return Err(SchemaError::new(
                        SchemaErrorKind::RangeViolation,
                        spec.name,
                        format!("{n} is not {range}"),
                    ));
                }
            }
            Ok(Some(FieldValue::Number(n)))
        }
        FieldKind::Text => {
            let s = value
                .as_str()
                .ok_or_else(|| type_mismatch(spec.name, "string", value))?
                .trim();
            if s.is_empty() {
                if spec.required {
                    return Err(SchemaError::missing(spec.name));
                }
                return Ok(None);
            }
            Ok(Some(FieldValue::Text(s.to_string())))
        }
    }
}

fn parse_timestamp(
    obj: &Map<String, Value>,
    spec: &TimestampSpec,
) -> Result<Option<DateTime<Utc>>, SchemaError> {
    let value = match obj.get(spec.key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    let parsed = match spec.format {
        TimestampFormat::Rfc3339 => {
            let s = value
                .as_str()
                .ok_or_else(|| type_mismatch(spec.key, "RFC 3339 string", value))?;
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    SchemaError::new(SchemaErrorKind::TypeMismatch, spec.key, format!("'{s}': {e}"))
                })?
        }
        TimestampFormat::UnixSeconds => {
            let secs = value
                .as_i64()
                .ok_or_else(|| type_mismatch(spec.key, "integer seconds", value))?;
            DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                SchemaError::new(
                    SchemaErrorKind::RangeViolation,
                    spec.key,
                    format!("{secs} is outside the representable range"),
                )
            })?
        }
        TimestampFormat::Date => {
            let s = value
                .as_str()
                .ok_or_else(|| type_mismatch(spec.key, "YYYY-MM-DD string", value))?;
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(NaiveTime::default()).and_utc())
                .map_err(|e| {
                    SchemaError::new(SchemaErrorKind::TypeMismatch, spec.key, format!("'{s}': {e}"))
                })?
        }
    };

    Ok(Some(parsed))
}

fn type_mismatch(field: &str, expected: &str, got: &Value) -> SchemaError {
    SchemaError::new(
        SchemaErrorKind::TypeMismatch,
        field,
        format!("expected {expected}, got {}", json_kind(got)),
    )
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
