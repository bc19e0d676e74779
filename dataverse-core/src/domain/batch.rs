//! Batch — the surviving records of one extraction call.

use super::record::MarketRecord;
use super::source::Source;
use crate::validate::SchemaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate record that failed validation and was left out of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRecord {
    /// Position of the candidate in the decoded response.
    pub index: usize,
    /// Symbol, when the candidate carried a readable one.
    pub symbol: Option<String>,
    pub error: SchemaError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch for {0} has no records")]
    Empty(Source),

    #[error("record for {symbol} belongs to {found}, batch is {expected}")]
    SourceMismatch {
        symbol: String,
        expected: Source,
        found: Source,
    },
}

/// Ordered, non-empty set of validated records from a single source.
#[derive(Debug, Clone)]
pub struct Batch {
    source: Source,
    extracted_at: DateTime<Utc>,
    records: Vec<MarketRecord>,
    dropped: Vec<DroppedRecord>,
}

impl Batch {
    pub fn new(
        source: Source,
        extracted_at: DateTime<Utc>,
        records: Vec<MarketRecord>,
        dropped: Vec<DroppedRecord>,
    ) -> Result<Self, BatchError> {
        if records.is_empty() {
            return Err(BatchError::Empty(source));
        }
        if let Some(stray) = records.iter().find(|r| r.source() != source) {
            return Err(BatchError::SourceMismatch {
                symbol: stray.symbol().to_string(),
                expected: source,
                found: stray.source(),
            });
        }
        Ok(Self {
            source,
            extracted_at,
            records,
            dropped,
        })
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    pub fn records(&self) -> &[MarketRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MarketRecord> {
        self.records
    }

    pub fn dropped(&self) -> &[DroppedRecord] {
        &self.dropped
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// True when at least one candidate was dropped by validation.
    pub fn is_partial(&self) -> bool {
        !self.dropped.is_empty()
    }
}
