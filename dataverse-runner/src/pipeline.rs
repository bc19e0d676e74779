//! Pipeline orchestration.
//!
//! One entry point per stage:
//! - [`Pipeline::run_extraction`]: fetch, validate and publish a bronze snapshot
//! - [`Pipeline::run_promotion`]: latest bronze to silver, then silver to gold
//! - [`Pipeline::run_cycle`]: every enabled source, failures isolated per source
//!
//! Every run ends in exactly one `RunRecord`, appended to the run log. Errors
//! never escape a run; they become the record's `error_detail`.

use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use dataverse_core::domain::{Snapshot, Source, Tier};
use dataverse_core::extract::{ExtractionError, Extractor};
use dataverse_core::http::{FetchError, HttpClient};
use dataverse_core::storage::{
    LayeredWriter, LocalFs, ReadError, SnapshotReader, StorageBackend, WriteError,
};
use dataverse_core::transform::{aggregate, clean, SilverBatch};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::run::{CancelToken, RunAbort, RunRecord, RunState, RunTracker};
use crate::run_log::RunLogger;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
}

/// Why a promotion run did not publish.
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("no {0} records left after cleaning")]
    NothingToPromote(Source),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Internal: how a run step stopped short.
#[derive(Debug)]
enum Halt {
    Abort(RunAbort),
    Failed(String),
}

impl From<RunAbort> for Halt {
    fn from(abort: RunAbort) -> Self {
        Halt::Abort(abort)
    }
}

impl From<ExtractionError> for Halt {
    fn from(e: ExtractionError) -> Self {
        Halt::Failed(e.to_string())
    }
}

impl From<WriteError> for Halt {
    fn from(e: WriteError) -> Self {
        Halt::Failed(e.to_string())
    }
}

impl From<PromotionError> for Halt {
    fn from(e: PromotionError) -> Self {
        Halt::Failed(e.to_string())
    }
}

/// Silver and gold records of one promotion. `gold` is `None` when silver failed.
#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    pub silver: RunRecord,
    pub gold: Option<RunRecord>,
}

impl PromotionOutcome {
    pub fn is_success(&self) -> bool {
        self.silver.is_success() && self.gold.as_ref().is_some_and(RunRecord::is_success)
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        std::iter::once(&self.silver).chain(self.gold.iter())
    }
}

/// Everything one source did during a cycle.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: Source,
    pub extraction: RunRecord,
    /// Skipped when extraction failed.
    pub promotion: Option<PromotionOutcome>,
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        self.extraction.is_success()
            && self
                .promotion
                .as_ref()
                .is_some_and(PromotionOutcome::is_success)
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        std::iter::once(&self.extraction).chain(self.promotion.iter().flat_map(|p| p.records()))
    }
}

/// Result of one cycle, for alerting.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<SourceOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl CycleSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn total_rows(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| if o.extraction.is_success() { o.extraction.rows_written } else { 0 })
            .sum()
    }

    pub fn failed_sources(&self) -> Vec<Source> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.source)
            .collect()
    }

    pub fn log_summary(&self) {
        let failed: Vec<_> = self.failed_sources().iter().map(Source::as_str).collect();
        if self.all_succeeded() {
            tracing::info!(
                succeeded = self.succeeded,
                failed = self.failed,
                rows = self.total_rows(),
                elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
                "cycle complete"
            );
        } else {
            tracing::warn!(
                succeeded = self.succeeded,
                failed = self.failed,
                failed_sources = %failed.join(","),
                rows = self.total_rows(),
                elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
                "cycle complete with failures"
            );
        }
    }
}

pub struct Pipeline<B: StorageBackend = LocalFs> {
    config: PipelineConfig,
    client: HttpClient,
    writer: LayeredWriter<B>,
    reader: SnapshotReader,
    logger: RunLogger,
    cancel: CancelToken,
}

impl Pipeline<LocalFs> {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_backend(config, LocalFs)
    }
}

impl<B: StorageBackend> Pipeline<B> {
    pub fn with_backend(config: PipelineConfig, backend: B) -> Result<Self, PipelineError> {
        let client = HttpClient::new(config.retry_policy(), config.http_timeout())?;
        Ok(Self {
            writer: LayeredWriter::with_backend(&config.storage_root, backend),
            reader: SnapshotReader::new(&config.storage_root),
            logger: RunLogger::new(&config.log_dir),
            client,
            cancel: CancelToken::new(),
            config,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn logger(&self) -> &RunLogger {
        &self.logger
    }

    pub fn reader(&self) -> &SnapshotReader {
        &self.reader
    }

    /// Extract one source into a bronze snapshot.
    pub fn run_extraction(&self, source: Source) -> RunRecord {
        let mut tracker = RunTracker::start(source, Tier::Bronze, self.cancel.clone());
        let span = tracing::info_span!("run", %source, stage = "bronze", run_id = %tracker.run_id());
        let _guard = span.enter();

        let outcome = self.extract(&mut tracker, source);
        self.finish(tracker, outcome)
    }

    fn extract(&self, tracker: &mut RunTracker, source: Source) -> Result<(Snapshot, usize), Halt> {
        tracker.enter(RunState::Fetching)?;
        let extractor = Extractor::from_boxed(self.config.source_api(source), self.client.clone());
        let extracted_at = Utc::now().trunc_subsecs(3);
        let candidates = extractor.fetch()?;
        tracing::debug!(candidates = candidates.len(), "response decoded");

        tracker.enter(RunState::Validating)?;
        let batch = extractor.validate(&candidates, extracted_at)?;

        tracker.enter(RunState::Writing)?;
        let snapshot = self.writer.write(&batch, Tier::Bronze)?;
        Ok((snapshot, batch.dropped().len()))
    }

    /// Promote the latest bronze snapshot to silver, then to gold.
    pub fn run_promotion(&self, source: Source) -> PromotionOutcome {
        let mut tracker = RunTracker::start(source, Tier::Silver, self.cancel.clone());
        let silver_outcome = {
            let span =
                tracing::info_span!("run", %source, stage = "silver", run_id = %tracker.run_id());
            let _guard = span.enter();
            self.promote_silver(&mut tracker, source)
        };

        let (silver_outcome, batch) = match silver_outcome {
            Ok((snapshot, dropped, batch)) => (Ok((snapshot, dropped)), Some(batch)),
            Err(halt) => (Err(halt), None),
        };
        let silver = self.finish(tracker, silver_outcome);

        let gold = match batch {
            Some(batch) if silver.is_success() => Some(self.run_gold(&batch)),
            _ => None,
        };
        PromotionOutcome { silver, gold }
    }

    fn promote_silver(
        &self,
        tracker: &mut RunTracker,
        source: Source,
    ) -> Result<(Snapshot, usize, SilverBatch), Halt> {
        tracker.enter(RunState::Fetching)?;
        let entry = self
            .reader
            .latest(Tier::Bronze, source)
            .map_err(PromotionError::from)?;
        let records = self
            .reader
            .read_records(&entry)
            .map_err(PromotionError::from)?;
        tracing::debug!(path = %entry.path.display(), rows = records.len(), "bronze loaded");

        tracker.enter(RunState::Validating)?;
        let processed_at = Utc::now().trunc_subsecs(3);
        let silver = clean(records, source, entry.taken_at, processed_at)
            .ok_or(PromotionError::NothingToPromote(source))?;
        let removed = silver.duplicates_removed + silver.invalid_removed;

        tracker.enter(RunState::Writing)?;
        let snapshot = self.writer.write(&silver, Tier::Silver)?;
        Ok((snapshot, removed, silver))
    }

    fn run_gold(&self, silver: &SilverBatch) -> RunRecord {
        let source = silver.source;
        let mut tracker = RunTracker::start(source, Tier::Gold, self.cancel.clone());
        let span = tracing::info_span!("run", %source, stage = "gold", run_id = %tracker.run_id());
        let _guard = span.enter();

        let outcome = (|| -> Result<(Snapshot, usize), Halt> {
            // Input is the silver batch just published.
            tracker.enter(RunState::Fetching)?;
            tracker.enter(RunState::Validating)?;
            let gold = aggregate(silver, Utc::now().trunc_subsecs(3));
            tracker.enter(RunState::Writing)?;
            Ok((self.writer.write(&gold, Tier::Gold)?, 0))
        })();
        self.finish(tracker, outcome)
    }

    fn finish(&self, tracker: RunTracker, outcome: Result<(Snapshot, usize), Halt>) -> RunRecord {
        let record = match outcome {
            Ok((snapshot, dropped)) => tracker.succeed(&snapshot, dropped),
            Err(Halt::Abort(abort)) => tracker.abort(abort),
            Err(Halt::Failed(detail)) => tracker.fail(detail),
        };
        if let Err(e) = self.logger.record(&record) {
            tracing::error!(run_id = %record.run_id, error = %e, "failed to append run log");
        }
        record
    }

    /// Extraction then promotion for every enabled source, in order.
    pub fn run_cycle(&self) -> CycleSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        let sources = self.config.enabled_sources();
        tracing::info!(sources = sources.len(), "cycle started");

        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            let extraction = self.run_extraction(source);
            let promotion = extraction
                .is_success()
                .then(|| self.run_promotion(source));
            outcomes.push(SourceOutcome {
                source,
                extraction,
                promotion,
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let summary = CycleSummary {
            started_at,
            failed: outcomes.len() - succeeded,
            succeeded,
            outcomes,
            elapsed: clock.elapsed(),
        };
        summary.log_summary();
        summary
    }

    /// Repeat the cycle every `schedule_interval_minutes` until cancelled or
    /// `max_cycles` have run. Returns the number of cycles run.
    pub fn run_daemon(&self, max_cycles: Option<usize>) -> usize {
        let interval = self.config.schedule_interval();
        tracing::info!(interval_minutes = self.config.schedule_interval_minutes, "daemon started");

        let mut cycles = 0;
        while !self.cancel.is_cancelled() {
            self.run_cycle();
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            tracing::info!(next_in_minutes = self.config.schedule_interval_minutes, "cycle finished");
            self.sleep_unless_cancelled(interval);
        }
        tracing::info!(cycles, "daemon stopped");
        cycles
    }

    fn sleep_unless_cancelled(&self, total: Duration) {
        const TICK: Duration = Duration::from_millis(250);
        // An unrepresentable deadline waits until cancelled.
        let deadline = Instant::now().checked_add(total);
        while !self.cancel.is_cancelled() {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => TICK,
            };
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(TICK.min(remaining));
        }
    }
}

/// Single extraction with a fresh pipeline built from `config`.
pub fn run_extraction(config: &PipelineConfig, source: Source) -> Result<RunRecord, PipelineError> {
    Ok(Pipeline::new(config.clone())?.run_extraction(source))
}

pub fn run_promotion(config: &PipelineConfig, source: Source) -> Result<PromotionOutcome, PipelineError> {
    Ok(Pipeline::new(config.clone())?.run_promotion(source))
}

pub fn run_cycle(config: &PipelineConfig) -> Result<CycleSummary, PipelineError> {
    Ok(Pipeline::new(config.clone())?.run_cycle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunStatus, CANCELLED};

    fn offline_config(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.storage_root = dir.join("data");
        config.log_dir = dir.join("logs");
        config.retry.max_attempts = 1;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 1;
        config
    }

    #[test]
    fn missing_stock_key_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.stock.api_key = None;
        let pipeline = Pipeline::new(config).unwrap();

        let record = pipeline.run_extraction(Source::Stock);
        assert_eq!(record.status, RunStatus::Failure);
        assert_eq!(record.failed_in, Some(RunState::Fetching));
        assert!(record.error_detail.unwrap().contains("STOCK_API_KEY"));
        assert_eq!(pipeline.logger().read_all().unwrap().len(), 1);
    }

    #[test]
    fn promotion_without_bronze_fails_silver_and_skips_gold() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(offline_config(dir.path())).unwrap();

        let outcome = pipeline.run_promotion(Source::Forex);
        assert!(!outcome.silver.is_success());
        assert!(outcome.gold.is_none());
        assert!(outcome.silver.error_detail.unwrap().contains("no bronze snapshot"));
    }

    #[test]
    fn cancelled_pipeline_records_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(offline_config(dir.path())).unwrap();
        pipeline.cancel_token().cancel();

        let record = pipeline.run_extraction(Source::Crypto);
        assert_eq!(record.error_detail.as_deref(), Some(CANCELLED));
        assert_eq!(record.failed_in, Some(RunState::Started));
        assert_eq!(pipeline.run_daemon(None), 0);
    }

    #[test]
    fn disabled_sources_are_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.crypto.enabled = false;
        config.forex.enabled = false;
        config.stock.api_key = None;
        let summary = Pipeline::new(config).unwrap().run_cycle();

        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.failed_sources(), vec![Source::Stock]);
        assert!(summary.outcomes[0].promotion.is_none());
    }

    #[test]
    fn unbounded_sleep_ends_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(offline_config(dir.path())).unwrap();
        let cancel = pipeline.cancel_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });

        let clock = Instant::now();
        pipeline.sleep_unless_cancelled(Duration::MAX);
        canceller.join().unwrap();
        assert!(clock.elapsed() < Duration::from_secs(5));
    }
}
