//! Storage tiers and the Snapshot artifact.

use super::source::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Storage tier: raw, cleaned, aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Bronze, Tier::Silver, Tier::Gold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }

    /// On-disk format for the tier. Bronze and silver stay human-readable CSV,
    /// gold is columnar for the query layer.
    pub fn format(&self) -> SnapshotFormat {
        match self {
            Tier::Bronze | Tier::Silver => SnapshotFormat::Csv,
            Tier::Gold => SnapshotFormat::Parquet,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tier '{0}' (expected bronze, silver or gold)")]
pub struct ParseTierError(pub String);

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            _ => Err(ParseTierError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Csv,
    Parquet,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Csv => "csv",
            SnapshotFormat::Parquet => "parquet",
        }
    }
}

/// A published, immutable tier artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tier: Tier,
    pub source: Source,
    pub path: PathBuf,
    pub format: SnapshotFormat,
    pub row_count: usize,
    /// BLAKE3 hex digest of the published bytes.
    pub content_hash: String,
    /// Timestamp encoded in the path.
    pub taken_at: DateTime<Utc>,
    /// True when an identical artifact already existed and nothing was written.
    pub reused: bool,
}
