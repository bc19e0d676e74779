//! Snapshot path layout: `{tier}/{source}/{source}_{timestamp}.{ext}`.
//!
//! The timestamp is ISO 8601 basic format in UTC with millisecond precision,
//! e.g. `crypto_20240301T120000.000Z.csv`, so lexical order is time order.

use crate::domain::{Source, Tier};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

pub const PATH_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Path of a snapshot relative to the storage root.
pub fn snapshot_path(tier: Tier, source: Source, ts: DateTime<Utc>) -> PathBuf {
    tier_dir(tier, source).join(file_name(tier, source, ts))
}

pub fn tier_dir(tier: Tier, source: Source) -> PathBuf {
    Path::new(tier.as_str()).join(source.as_str())
}

pub fn file_name(tier: Tier, source: Source, ts: DateTime<Utc>) -> String {
    format!(
        "{source}_{}.{}",
        ts.format(PATH_TIMESTAMP_FORMAT),
        tier.format().extension()
    )
}

/// Recover the timestamp from a snapshot file name. `None` for anything that
/// is not a published snapshot of this tier and source.
pub fn parse_file_name(tier: Tier, source: Source, name: &str) -> Option<DateTime<Utc>> {
    let stem = name
        .strip_prefix(source.as_str())?
        .strip_prefix('_')?
        .strip_suffix(tier.format().extension())?
        .strip_suffix('.')?;
    NaiveDateTime::parse_from_str(stem, PATH_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}
