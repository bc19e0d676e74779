//! Run lifecycle: identifiers, the state machine, cancellation and the
//! immutable `RunRecord` each run ends with.
//!
//! ```text
//! Started -> Fetching -> Validating -> Writing -> Succeeded
//!    \__________\____________\___________\-----> Failed
//! ```
//!
//! Promotion runs reuse the same states: `Fetching` reads the input snapshot
//! and `Validating` cleans or aggregates it.

use chrono::{DateTime, Utc};
use dataverse_core::domain::{Snapshot, Source, Tier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Which tier a run publishes to.
pub type RunStage = Tier;

/// Error detail recorded for a cancelled run.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Started,
    Fetching,
    Validating,
    Writing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal run transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// The state after moving to `next`, if that move is legal.
    pub fn advance(self, next: RunState) -> Result<RunState, InvalidTransition> {
        use RunState::*;
        let legal = match (self, next) {
            (Started, Fetching) | (Fetching, Validating) | (Validating, Writing) => true,
            (Writing, Succeeded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        };
        if legal {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Started => "started",
            RunState::Fetching => "fetching",
            RunState::Validating => "validating",
            RunState::Writing => "writing",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Shared cancellation flag. Checked before each non-terminal transition, so
/// a run that has started writing always finishes its write.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a tracked run cannot move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunAbort {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Audit entry for one run. Built only by [`RunTracker`], never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub source: Source,
    pub stage: RunStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub state: RunState,
    /// State the run was in when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<RunState>,
    pub rows_written: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default)]
    pub dropped_records: usize,
    #[serde(default)]
    pub partial: bool,
    /// True when the snapshot already existed with identical content.
    #[serde(default)]
    pub reused: bool,
}

impl RunRecord {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// `rows_written` always equals the snapshot's row count.
    fn success(header: Header, snapshot: &Snapshot, dropped_records: usize) -> Self {
        Self {
            run_id: header.run_id,
            source: header.source,
            stage: header.stage,
            started_at: header.started_at,
            finished_at: header.finished_at,
            duration_ms: header.duration_ms,
            status: RunStatus::Success,
            state: RunState::Succeeded,
            failed_in: None,
            rows_written: snapshot.row_count,
            error_detail: None,
            snapshot_path: Some(snapshot.path.clone()),
            dropped_records,
            partial: dropped_records > 0,
            reused: snapshot.reused,
        }
    }

    fn failure(header: Header, failed_in: RunState, detail: String) -> Self {
        Self {
            run_id: header.run_id,
            source: header.source,
            stage: header.stage,
            started_at: header.started_at,
            finished_at: header.finished_at,
            duration_ms: header.duration_ms,
            status: RunStatus::Failure,
            state: RunState::Failed,
            failed_in: Some(failed_in),
            rows_written: 0,
            error_detail: Some(detail),
            snapshot_path: None,
            dropped_records: 0,
            partial: false,
            reused: false,
        }
    }
}

struct Header {
    run_id: String,
    source: Source,
    stage: RunStage,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: u64,
}

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// 16 hex chars of BLAKE3 over source, stage, start time, pid and a counter.
pub fn new_run_id(source: Source, stage: RunStage, started_at: DateTime<Utc>) -> String {
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
    let seed = format!(
        "{source}:{stage}:{}:{}:{seq}",
        started_at.timestamp_nanos_opt().unwrap_or_default(),
        std::process::id()
    );
    blake3::hash(seed.as_bytes()).to_hex()[..16].to_string()
}

/// Drives one run through its states and produces its record.
#[derive(Debug)]
pub struct RunTracker {
    run_id: String,
    source: Source,
    stage: RunStage,
    started_at: DateTime<Utc>,
    clock: Instant,
    state: RunState,
    cancel: CancelToken,
}

impl RunTracker {
    pub fn start(source: Source, stage: RunStage, cancel: CancelToken) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: new_run_id(source, stage, started_at),
            source,
            stage,
            started_at,
            clock: Instant::now(),
            state: RunState::Started,
            cancel,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to a non-terminal state. Refused once cancellation is requested.
    pub fn enter(&mut self, next: RunState) -> Result<(), RunAbort> {
        if self.cancel.is_cancelled() {
            return Err(RunAbort::Cancelled);
        }
        self.state = self.state.advance(next)?;
        tracing::debug!(run_id = %self.run_id, state = %self.state, "run state");
        Ok(())
    }

    /// Finish successfully. A snapshot with no rows, or a run that never
    /// reached `Writing`, is recorded as a failure instead.
    pub fn succeed(self, snapshot: &Snapshot, dropped_records: usize) -> RunRecord {
        if snapshot.row_count == 0 {
            return self.fail("published snapshot has no rows");
        }
        if let Err(e) = self.state.advance(RunState::Succeeded) {
            return self.fail(e.to_string());
        }
        let header = self.header();
        RunRecord::success(header, snapshot, dropped_records)
    }

    pub fn fail(self, detail: impl Into<String>) -> RunRecord {
        let failed_in = self.state;
        RunRecord::failure(self.header(), failed_in, detail.into())
    }

    pub fn abort(self, reason: RunAbort) -> RunRecord {
        match reason {
            RunAbort::Cancelled => self.fail(CANCELLED),
            other => self.fail(other.to_string()),
        }
    }

    fn header(&self) -> Header {
        Header {
            run_id: self.run_id.clone(),
            source: self.source,
            stage: self.stage,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}
