//! Tiered snapshot storage: bronze (raw), silver (cleaned), gold (aggregated).

pub mod backend;
pub mod layout;
pub mod reader;
pub mod tabular;
pub mod writer;

pub use backend::{LocalFs, StorageBackend};
pub use layout::{parse_file_name, snapshot_path, PATH_TIMESTAMP_FORMAT};
pub use reader::{ReadError, SnapshotEntry, SnapshotReader};
pub use tabular::{encode_csv, encode_parquet, to_dataframe, Cell, Tabular};
pub use writer::{LayeredWriter, WriteError};
