//! Dataverse Core: market-data extraction, validation and tiered storage.
//!
//! This crate holds everything one pipeline run needs below the orchestration
//! layer:
//! - Domain types (sources, records, batches, snapshots)
//! - Retrying HTTP client with an injected backoff policy
//! - Static per-source schemas and the record validator
//! - Source extractors for crypto, stock and forex APIs
//! - Layered bronze/silver/gold writer and snapshot reader
//! - Silver cleaning and gold aggregation

pub mod domain;
pub mod extract;
pub mod http;
pub mod storage;
pub mod transform;
pub mod validate;
