//! Market data source — one variant per upstream API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which market the data came from.
///
/// Each source maps to exactly one upstream API and one schema declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Crypto,
    Stock,
    Forex,
}

impl Source {
    /// All sources in canonical run order.
    pub const ALL: [Source; 3] = [Source::Crypto, Source::Stock, Source::Forex];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Crypto => "crypto",
            Source::Stock => "stock",
            Source::Forex => "forex",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source '{0}' (expected crypto, stock or forex)")]
pub struct ParseSourceError(pub String);

impl FromStr for Source {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(Source::Crypto),
            "stock" => Ok(Source::Stock),
            "forex" => Ok(Source::Forex),
            _ => Err(ParseSourceError(s.to_string())),
        }
    }
}
