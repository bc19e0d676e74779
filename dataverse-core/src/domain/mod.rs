//! Domain types shared by every pipeline stage.

pub mod batch;
pub mod record;
pub mod snapshot;
pub mod source;

pub use batch::{Batch, BatchError, DroppedRecord};
pub use record::{CryptoFields, FieldValue, ForexFields, MarketRecord, RecordFields, StockFields};
pub use snapshot::{ParseTierError, Snapshot, SnapshotFormat, Tier};
pub use source::{ParseSourceError, Source};
