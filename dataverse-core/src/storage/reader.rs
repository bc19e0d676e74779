//! Reading published snapshots back.
//!
//! Bronze and silver snapshots share their leading columns (`symbol`,
//! `timestamp`, then the source metrics), so one parser recovers typed
//! records from either. Gold snapshots load as a polars `DataFrame`.

use super::layout::{parse_file_name, tier_dir};
use crate::domain::{
    CryptoFields, ForexFields, MarketRecord, RecordFields, Source, StockFields, Tier,
};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no {0} snapshot for {1}")]
    NotFound(Tier, Source),

    #[error("i/o error at {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("{path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    #[error("{0} snapshots are not CSV; load them with read_frame")]
    WrongFormat(Tier),
}

/// A published snapshot found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub tier: Tier,
    pub source: Source,
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotReader {
    root: PathBuf,
}

impl SnapshotReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Published snapshots for `(tier, source)`, oldest first.
    ///
    /// Temporary files and anything not named like a snapshot are ignored.
    pub fn list(&self, tier: Tier, source: Source) -> Result<Vec<SnapshotEntry>, ReadError> {
        let dir = self.root.join(tier_dir(tier, source));
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let io = |error| ReadError::Io {
            path: dir.clone(),
            error,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io)? {
            let entry = entry.map_err(io)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(taken_at) = parse_file_name(tier, source, name) {
                entries.push(SnapshotEntry {
                    tier,
                    source,
                    path: entry.path(),
                    taken_at,
                });
            }
        }
        entries.sort_by_key(|e| e.taken_at);
        Ok(entries)
    }

    pub fn latest(&self, tier: Tier, source: Source) -> Result<SnapshotEntry, ReadError> {
        self.list(tier, source)?
            .pop()
            .ok_or(ReadError::NotFound(tier, source))
    }

    /// Typed records from a bronze or silver snapshot, in file order.
    pub fn read_records(&self, entry: &SnapshotEntry) -> Result<Vec<MarketRecord>, ReadError> {
        if entry.tier == Tier::Gold {
            return Err(ReadError::WrongFormat(entry.tier));
        }
        let malformed = |detail: String| ReadError::Malformed {
            path: entry.path.clone(),
            detail,
        };

        let mut rdr = csv::Reader::from_path(&entry.path).map_err(|e| malformed(e.to_string()))?;
        let header: HashMap<String, usize> = rdr
            .headers()
            .map_err(|e| malformed(e.to_string()))?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_string(), i))
            .collect();

        let mut records = Vec::new();
        for (line, row) in rdr.records().enumerate() {
            let row = row.map_err(|e| malformed(e.to_string()))?;
            let cells = RowCells {
                header: &header,
                row: &row,
            };
            let record = parse_record(entry.source, &cells)
                .map_err(|detail| malformed(format!("row {}: {detail}", line + 1)))?;
            records.push(record);
        }
        Ok(records)
    }

    /// A gold snapshot as a `DataFrame`.
    pub fn read_frame(&self, entry: &SnapshotEntry) -> Result<DataFrame, ReadError> {
        let file = fs::File::open(&entry.path).map_err(|error| ReadError::Io {
            path: entry.path.clone(),
            error,
        })?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| ReadError::Malformed {
                path: entry.path.clone(),
                detail: format!("read parquet: {e}"),
            })
    }
}

struct RowCells<'a> {
    header: &'a HashMap<String, usize>,
    row: &'a csv::StringRecord,
}

impl RowCells<'_> {
    fn raw(&self, col: &str) -> Result<&str, String> {
        self.header
            .get(col)
            .and_then(|&i| self.row.get(i))
            .ok_or_else(|| format!("missing column '{col}'"))
    }

    fn text(&self, col: &str) -> Result<String, String> {
        Ok(self.raw(col)?.to_string())
    }

    fn number(&self, col: &str) -> Result<f64, String> {
        self.optional_number(col)?
            .ok_or_else(|| format!("empty value in '{col}'"))
    }

    fn optional_number(&self, col: &str) -> Result<Option<f64>, String> {
        let raw = self.raw(col)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|e| format!("'{col}' = '{raw}': {e}"))
    }
}

fn parse_record(source: Source, c: &RowCells<'_>) -> Result<MarketRecord, String> {
    let ts = c.raw("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| format!("timestamp '{ts}': {e}"))?
        .with_timezone(&Utc);

    let fields = match source {
        Source::Crypto => RecordFields::Crypto(CryptoFields {
            coin_id: c.text("coin_id")?,
            name: c.text("name")?,
            current_price: c.number("current_price")?,
            market_cap: c.number("market_cap")?,
            total_volume: c.number("total_volume")?,
            price_change_pct_24h: c.optional_number("price_change_pct_24h")?,
        }),
        Source::Stock => RecordFields::Stock(StockFields {
            name: c.text("name")?,
            price: c.number("price")?,
            open: c.number("open")?,
            day_high: c.number("day_high")?,
            day_low: c.number("day_low")?,
            volume: c.number("volume")?,
            change_pct: c.number("change_pct")?,
        }),
        Source::Forex => RecordFields::Forex(ForexFields {
            base: c.text("base")?,
            quote: c.text("quote")?,
            rate: c.number("rate")?,
        }),
    };

    Ok(MarketRecord::new(c.text("symbol")?, timestamp, fields))
}
