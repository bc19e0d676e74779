//! Bronze -> silver: dedup, sanity re-check, derived metrics.

use crate::domain::{MarketRecord, RecordFields, Source, Tier};
use crate::storage::{Cell, Tabular};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const SMALL_CAP_CEILING: f64 = 1e9;
pub const MID_CAP_CEILING: f64 = 1e10;
pub const LARGE_CAP_CEILING: f64 = 1e11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarketCapCategory {
    Small,
    Mid,
    Large,
    Mega,
}

impl MarketCapCategory {
    pub fn from_market_cap(cap: f64) -> Self {
        if cap < SMALL_CAP_CEILING {
            MarketCapCategory::Small
        } else if cap < MID_CAP_CEILING {
            MarketCapCategory::Mid
        } else if cap < LARGE_CAP_CEILING {
            MarketCapCategory::Large
        } else {
            MarketCapCategory::Mega
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCapCategory::Small => "Small Cap",
            MarketCapCategory::Mid => "Mid Cap",
            MarketCapCategory::Large => "Large Cap",
            MarketCapCategory::Mega => "Mega Cap",
        }
    }
}

impl fmt::Display for MarketCapCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign of the day's percentage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Gainer,
    Loser,
    Flat,
}

impl Direction {
    pub fn from_change(change_pct: f64) -> Self {
        if change_pct > 0.0 {
            Direction::Gainer
        } else if change_pct < 0.0 {
            Direction::Loser
        } else {
            Direction::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Gainer => "gainer",
            Direction::Loser => "loser",
            Direction::Flat => "flat",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DerivedMetrics {
    Crypto {
        /// `None` when volume is zero.
        price_to_volume_ratio: Option<f64>,
        market_cap_category: MarketCapCategory,
    },
    Stock {
        day_range_pct: Option<f64>,
        direction: Direction,
    },
    Forex {
        inverse_rate: f64,
    },
}

impl DerivedMetrics {
    pub fn columns(source: Source) -> &'static [&'static str] {
        match source {
            Source::Crypto => &["price_to_volume_ratio", "market_cap_category"],
            Source::Stock => &["day_range_pct", "direction"],
            Source::Forex => &["inverse_rate"],
        }
    }

    pub fn derive(fields: &RecordFields) -> Self {
        match fields {
            RecordFields::Crypto(c) => DerivedMetrics::Crypto {
                price_to_volume_ratio: ratio(c.current_price, c.total_volume),
                market_cap_category: MarketCapCategory::from_market_cap(c.market_cap),
            },
            RecordFields::Stock(s) => DerivedMetrics::Stock {
                day_range_pct: ratio(s.day_high - s.day_low, s.day_low).map(|r| r * 100.0),
                direction: Direction::from_change(s.change_pct),
            },
            RecordFields::Forex(x) => DerivedMetrics::Forex {
                inverse_rate: 1.0 / x.rate,
            },
        }
    }

    /// Label used to group rows in the gold tier.
    pub fn group_key(&self, record: &MarketRecord) -> String {
        match self {
            DerivedMetrics::Crypto {
                market_cap_category,
                ..
            } => market_cap_category.to_string(),
            DerivedMetrics::Stock { direction, .. } => direction.to_string(),
            DerivedMetrics::Forex { .. } => match record.fields() {
                RecordFields::Forex(x) => x.base.clone(),
                _ => record.symbol().to_string(),
            },
        }
    }

    fn values(&self) -> Vec<Cell> {
        match self {
            DerivedMetrics::Crypto {
                price_to_volume_ratio,
                market_cap_category,
            } => vec![
                (*price_to_volume_ratio).into(),
                market_cap_category.as_str().into(),
            ],
            DerivedMetrics::Stock {
                day_range_pct,
                direction,
            } => vec![(*day_range_pct).into(), direction.as_str().into()],
            DerivedMetrics::Forex { inverse_rate } => vec![(*inverse_rate).into()],
        }
    }
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    (den != 0.0).then(|| num / den).filter(|r| r.is_finite())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SilverRow {
    pub record: MarketRecord,
    pub derived: DerivedMetrics,
}

#[derive(Debug, Clone)]
pub struct SilverBatch {
    pub source: Source,
    /// `extracted_at` of the bronze batch this was cleaned from.
    pub source_extracted_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub rows: Vec<SilverRow>,
    pub duplicates_removed: usize,
    pub invalid_removed: usize,
}

/// Clean bronze records into a silver batch.
///
/// Keeps the first occurrence of each record, keyed by coin id for crypto and
/// by symbol otherwise. Drops records of another source or with a non-positive
/// price. Returns `None` when nothing is left.
pub fn clean(
    records: Vec<MarketRecord>,
    source: Source,
    source_extracted_at: DateTime<Utc>,
    processed_at: DateTime<Utc>,
) -> Option<SilverBatch> {
    let mut seen = HashSet::new();
    let mut duplicates_removed = 0;
    let mut invalid_removed = 0;
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        if record.source() != source || !is_sane(record.fields()) {
            invalid_removed += 1;
            continue;
        }
        if !seen.insert(record.dedupe_key().to_string()) {
            duplicates_removed += 1;
            continue;
        }
        let derived = DerivedMetrics::derive(record.fields());
        rows.push(SilverRow { record, derived });
    }

    if duplicates_removed + invalid_removed > 0 {
        tracing::debug!(%source, duplicates_removed, invalid_removed, "silver cleaning removed rows");
    }
    if rows.is_empty() {
        return None;
    }
    Some(SilverBatch {
        source,
        source_extracted_at,
        processed_at,
        rows,
        duplicates_removed,
        invalid_removed,
    })
}

fn is_sane(fields: &RecordFields) -> bool {
    let price = fields.price();
    price.is_finite() && price > 0.0 && fields.volume().map_or(true, |v| v.is_finite() && v >= 0.0)
}

impl Tabular for SilverBatch {
    fn tier(&self) -> Tier {
        Tier::Silver
    }

    fn source(&self) -> Source {
        self.source
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.processed_at
    }

    fn columns(&self) -> Vec<&'static str> {
        let mut cols = MarketRecord::header(self.source);
        cols.extend_from_slice(DerivedMetrics::columns(self.source));
        cols.push("processed_at");
        cols
    }

    fn rows(&self) -> Vec<Vec<Cell>> {
        let processed_at = self.processed_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.rows
            .iter()
            .map(|r| {
                let mut row = r.record.row();
                row.extend(r.derived.values());
                row.push(processed_at.as_str().into());
                row
            })
            .collect()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}
