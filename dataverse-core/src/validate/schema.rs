//! Static schema declarations, one per source.
//!
//! A `SourceSchema` names the JSON keys a candidate record must carry, the
//! value type of each key, and an acceptable numeric range where one makes
//! sense. Each schema also owns the builder that turns validated values into
//! the typed `RecordFields` variant for its source, so the declaration and
//! the struct it produces live side by side.

use super::validator::ValidatedFields;
use crate::domain::{CryptoFields, ForexFields, RecordFields, Source, StockFields};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pseudo field name used when the candidate itself has the wrong shape.
pub const RECORD_FIELD: &str = "<record>";

/// Why a candidate record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaErrorKind {
    MissingField,
    TypeMismatch,
    RangeViolation,
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaErrorKind::MissingField => "missing field",
            SchemaErrorKind::TypeMismatch => "type mismatch",
            SchemaErrorKind::RangeViolation => "range violation",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind} on '{field}': {detail}")]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub field: String,
    pub detail: String,
}

impl SchemaError {
    pub fn new(kind: SchemaErrorKind, field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(SchemaErrorKind::MissingField, field, "required field is absent or null")
    }
}

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
}

/// Acceptable numeric interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericRange {
    /// `> 0`
    Positive,
    /// `>= 0`
    NonNegative,
    /// `min <= v <= max`
    Between { min: f64, max: f64 },
}

impl NumericRange {
    pub fn contains(&self, v: f64) -> bool {
        match *self {
            NumericRange::Positive => v > 0.0,
            NumericRange::NonNegative => v >= 0.0,
            NumericRange::Between { min, max } => v >= min && v <= max,
        }
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericRange::Positive => f.write_str("> 0"),
            NumericRange::NonNegative => f.write_str(">= 0"),
            NumericRange::Between { min, max } => write!(f, "in [{min}, {max}]"),
        }
    }
}

/// Declaration for one field of a candidate record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub range: Option<NumericRange>,
}

impl FieldSpec {
    pub const fn number(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Number,
            required: true,
            range: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            required: true,
            range: None,
        }
    }

    pub const fn optional(self) -> Self {
        Self {
            required: false,
            ..self
        }
    }

    pub const fn within(self, range: NumericRange) -> Self {
        Self {
            range: Some(range),
            ..self
        }
    }
}

/// How a source encodes the observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `2024-03-01T12:00:00.000Z`
    Rfc3339,
    /// Seconds since the Unix epoch, as a JSON number.
    UnixSeconds,
    /// `2024-03-01`, read as midnight UTC.
    Date,
}

/// Where to find the observation time. Always optional: when absent the
/// extraction time stands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSpec {
    pub key: &'static str,
    pub format: TimestampFormat,
}

type BuildFn = fn(&ValidatedFields) -> Result<RecordFields, SchemaError>;

/// Complete expected shape for one source.
#[derive(Clone, Copy)]
pub struct SourceSchema {
    pub source: Source,
    pub symbol_key: &'static str,
    pub timestamp: Option<TimestampSpec>,
    pub fields: &'static [FieldSpec],
    pub build: BuildFn,
}

impl fmt::Debug for SourceSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSchema")
            .field("source", &self.source)
            .field("symbol_key", &self.symbol_key)
            .field("timestamp", &self.timestamp)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl SourceSchema {
    pub fn for_source(source: Source) -> &'static SourceSchema {
        match source {
            Source::Crypto => &CRYPTO_SCHEMA,
            Source::Stock => &STOCK_SCHEMA,
            Source::Forex => &FOREX_SCHEMA,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ── Declarations ────────────────────────────────────────────────────

/// CoinGecko `/coins/markets` element.
pub static CRYPTO_SCHEMA: SourceSchema = SourceSchema {
    source: Source::Crypto,
    symbol_key: "symbol",
    timestamp: Some(TimestampSpec {
        key: "last_updated",
        format: TimestampFormat::Rfc3339,
    }),
    fields: &[
        FieldSpec::text("id"),
        FieldSpec::text("name"),
        FieldSpec::number("current_price").within(NumericRange::Positive),
        FieldSpec::number("market_cap").within(NumericRange::NonNegative),
        FieldSpec::number("total_volume").within(NumericRange::NonNegative),
        FieldSpec::number("price_change_percentage_24h")
            .optional()
            .within(NumericRange::Between {
                min: -100.0,
                max: 100_000.0,
            }),
    ],
    build: build_crypto,
};

/// Equity quote element.
pub static STOCK_SCHEMA: SourceSchema = SourceSchema {
    source: Source::Stock,
    symbol_key: "symbol",
    timestamp: Some(TimestampSpec {
        key: "timestamp",
        format: TimestampFormat::UnixSeconds,
    }),
    fields: &[
        FieldSpec::text("name"),
        FieldSpec::number("price").within(NumericRange::Positive),
        FieldSpec::number("open").within(NumericRange::NonNegative),
        FieldSpec::number("dayHigh").within(NumericRange::NonNegative),
        FieldSpec::number("dayLow").within(NumericRange::NonNegative),
        FieldSpec::number("volume").within(NumericRange::NonNegative),
        FieldSpec::number("changesPercentage").within(NumericRange::Between {
            min: -100.0,
            max: 10_000.0,
        }),
    ],
    build: build_stock,
};

/// One currency pair, flattened out of a rates table by the forex extractor.
pub static FOREX_SCHEMA: SourceSchema = SourceSchema {
    source: Source::Forex,
    symbol_key: "pair",
    timestamp: Some(TimestampSpec {
        key: "date",
        format: TimestampFormat::Date,
    }),
    fields: &[
        FieldSpec::text("base"),
        FieldSpec::text("quote"),
        FieldSpec::number("rate").within(NumericRange::Positive),
    ],
    build: build_forex,
};

fn build_crypto(v: &ValidatedFields) -> Result<RecordFields, SchemaError> {
    Ok(RecordFields::Crypto(CryptoFields {
        coin_id: v.text("id")?,
        name: v.text("name")?,
        current_price: v.number("current_price")?,
        market_cap: v.number("market_cap")?,
        total_volume: v.number("total_volume")?,
        price_change_pct_24h: v.optional_number("price_change_percentage_24h"),
    }))
}

fn build_stock(v: &ValidatedFields) -> Result<RecordFields, SchemaError> {
    let day_high = v.number("dayHigh")?;
    let day_low = v.number("dayLow")?;
    if day_high < day_low {
        return Err(SchemaError::new(
            SchemaErrorKind::RangeViolation,
            "dayHigh",
            format!("day high {day_high} is below day low {day_low}"),
        ));
    }
    Ok(RecordFields::Stock(StockFields {
        name: v.text("name")?,
        price: v.number("price")?,
        open: v.number("open")?,
        day_high,
        day_low,
        volume: v.number("volume")?,
        change_pct: v.number("changesPercentage")?,
    }))
}

fn build_forex(v: &ValidatedFields) -> Result<RecordFields, SchemaError> {
    Ok(RecordFields::Forex(ForexFields {
        base: v.text("base")?.to_ascii_uppercase(),
        quote: v.text("quote")?.to_ascii_uppercase(),
        rate: v.number("rate")?,
    }))
}
