//! MarketRecord — one normalized observation from a source API.
//!
//! Per-source metrics are carried as typed structs (`CryptoFields`,
//! `StockFields`, `ForexFields`) rather than a string-keyed map, so every
//! required field is checked by the compiler once a record exists. The
//! tabular view (`columns` / `values`) is derived from the typed fields and is
//! the column contract downstream readers rely on.

use super::source::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value in the tabular view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Null => Ok(()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Number)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// CoinGecko `/coins/markets` metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoFields {
    pub coin_id: String,
    pub name: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub total_volume: f64,
    pub price_change_pct_24h: Option<f64>,
}

/// Equity quote metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFields {
    pub name: String,
    pub price: f64,
    pub open: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub volume: f64,
    pub change_pct: f64,
}

/// Exchange rate for one currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexFields {
    pub base: String,
    pub quote: String,
    pub rate: f64,
}

pub const CRYPTO_COLUMNS: &[&str] = &[
    "coin_id",
    "name",
    "current_price",
    "market_cap",
    "total_volume",
    "price_change_pct_24h",
];

pub const STOCK_COLUMNS: &[&str] = &[
    "name",
    "price",
    "open",
    "day_high",
    "day_low",
    "volume",
    "change_pct",
];

pub const FOREX_COLUMNS: &[&str] = &["base", "quote", "rate"];

/// Source-specific metrics, one variant per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RecordFields {
    Crypto(CryptoFields),
    Stock(StockFields),
    Forex(ForexFields),
}

impl RecordFields {
    pub fn source(&self) -> Source {
        match self {
            RecordFields::Crypto(_) => Source::Crypto,
            RecordFields::Stock(_) => Source::Stock,
            RecordFields::Forex(_) => Source::Forex,
        }
    }

    /// Metric column names for a source, in output order.
    pub fn columns(source: Source) -> &'static [&'static str] {
        match source {
            Source::Crypto => CRYPTO_COLUMNS,
            Source::Stock => STOCK_COLUMNS,
            Source::Forex => FOREX_COLUMNS,
        }
    }

    /// Metric values aligned with [`RecordFields::columns`].
    pub fn values(&self) -> Vec<FieldValue> {
        match self {
            RecordFields::Crypto(c) => vec![
                c.coin_id.as_str().into(),
                c.name.as_str().into(),
                c.current_price.into(),
                c.market_cap.into(),
                c.total_volume.into(),
                c.price_change_pct_24h.into(),
            ],
            RecordFields::Stock(s) => vec![
                s.name.as_str().into(),
                s.price.into(),
                s.open.into(),
                s.day_high.into(),
                s.day_low.into(),
                s.volume.into(),
                s.change_pct.into(),
            ],
            RecordFields::Forex(x) => vec![
                x.base.as_str().into(),
                x.quote.as_str().into(),
                x.rate.into(),
            ],
        }
    }

    /// Headline price: coin price, last trade, or exchange rate.
    pub fn price(&self) -> f64 {
        match self {
            RecordFields::Crypto(c) => c.current_price,
            RecordFields::Stock(s) => s.price,
            RecordFields::Forex(x) => x.rate,
        }
    }

    /// Traded volume, where the source reports one.
    pub fn volume(&self) -> Option<f64> {
        match self {
            RecordFields::Crypto(c) => Some(c.total_volume),
            RecordFields::Stock(s) => Some(s.volume),
            RecordFields::Forex(_) => None,
        }
    }
}

/// One normalized observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    symbol: String,
    timestamp: DateTime<Utc>,
    fields: RecordFields,
}

impl MarketRecord {
    /// The source is implied by the fields variant, so the two can never disagree.
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>, fields: RecordFields) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            fields,
        }
    }

    pub fn source(&self) -> Source {
        self.fields.source()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &RecordFields {
        &self.fields
    }

    /// Identity for duplicate removal. Crypto tickers are shared between coins
    /// (bridged stablecoins), so crypto records are keyed by coin id.
    pub fn dedupe_key(&self) -> &str {
        match &self.fields {
            RecordFields::Crypto(c) => &c.coin_id,
            RecordFields::Stock(_) | RecordFields::Forex(_) => &self.symbol,
        }
    }

    /// Full tabular header for a source: `symbol`, `timestamp`, then metrics.
    pub fn header(source: Source) -> Vec<&'static str> {
        let mut cols = vec!["symbol", "timestamp"];
        cols.extend_from_slice(RecordFields::columns(source));
        cols
    }

    /// Full tabular row aligned with [`MarketRecord::header`].
    pub fn row(&self) -> Vec<FieldValue> {
        let mut row = vec![
            FieldValue::Text(self.symbol.clone()),
            FieldValue::Text(self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        ];
        row.extend(self.fields.values());
        row
    }
}
