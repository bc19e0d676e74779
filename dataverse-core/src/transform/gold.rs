//! Silver -> gold: one summary row per group.

use super::silver::SilverBatch;
use crate::domain::{Source, Tier};
use crate::storage::{Cell, Tabular};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GOLD_COLUMNS: [&str; 6] = [
    "group",
    "record_count",
    "mean_price",
    "min_price",
    "max_price",
    "total_volume",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldRow {
    pub group: String,
    pub record_count: usize,
    pub mean_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// `None` for sources without volume.
    pub total_volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GoldTable {
    pub source: Source,
    pub aggregated_at: DateTime<Utc>,
    /// Sorted by group.
    pub rows: Vec<GoldRow>,
}

#[derive(Default)]
struct Acc {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    volume: Option<f64>,
}

pub fn aggregate(silver: &SilverBatch, aggregated_at: DateTime<Utc>) -> GoldTable {
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();

    for row in &silver.rows {
        let price = row.record.fields().price();
        let acc = groups.entry(row.derived.group_key(&row.record)).or_default();
        if acc.count == 0 {
            acc.min = price;
            acc.max = price;
        } else {
            acc.min = acc.min.min(price);
            acc.max = acc.max.max(price);
        }
        acc.count += 1;
        acc.sum += price;
        if let Some(v) = row.record.fields().volume() {
            *acc.volume.get_or_insert(0.0) += v;
        }
    }

    let rows = groups
        .into_iter()
        .map(|(group, acc)| GoldRow {
            group,
            record_count: acc.count,
            mean_price: acc.sum / acc.count as f64,
            min_price: acc.min,
            max_price: acc.max,
            total_volume: acc.volume,
        })
        .collect();

    GoldTable {
        source: silver.source,
        aggregated_at,
        rows,
    }
}

impl Tabular for GoldTable {
    fn tier(&self) -> Tier {
        Tier::Gold
    }

    fn source(&self) -> Source {
        self.source
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.aggregated_at
    }

    fn columns(&self) -> Vec<&'static str> {
        GOLD_COLUMNS.to_vec()
    }

    fn rows(&self) -> Vec<Vec<Cell>> {
        self.rows
            .iter()
            .map(|r| {
                vec![
                    r.group.as_str().into(),
                    (r.record_count as f64).into(),
                    r.mean_price.into(),
                    r.min_price.into(),
                    r.max_price.into(),
                    r.total_volume.into(),
                ]
            })
            .collect()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}
