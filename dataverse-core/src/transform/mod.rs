//! Tier promotion: bronze records to silver rows to gold aggregates.

pub mod gold;
pub mod silver;

pub use gold::{aggregate, GoldRow, GoldTable, GOLD_COLUMNS};
pub use silver::{clean, DerivedMetrics, Direction, MarketCapCategory, SilverBatch, SilverRow};
