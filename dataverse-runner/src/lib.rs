//! Dataverse runner: configuration, run lifecycle, audit log and the
//! orchestration entry points that tie extraction and tier promotion together.

pub mod config;
pub mod pipeline;
pub mod run;
pub mod run_log;

pub use config::{ConfigError, CryptoConfig, ForexConfig, PipelineConfig, RetryConfig, StockConfig};
pub use pipeline::{
    run_cycle, run_extraction, run_promotion, CycleSummary, Pipeline, PipelineError,
    PromotionError, PromotionOutcome, SourceOutcome,
};
pub use run::{
    CancelToken, InvalidTransition, RunAbort, RunRecord, RunStage, RunState, RunStatus, RunTracker,
};
pub use run_log::{RunLogError, RunLogger};
