//! Run audit log.
//!
//! Every finished run is written twice under the log directory:
//! - `run_records.jsonl`: one `RunRecord` per line, append-only, machine-readable
//! - `pipeline_runs.log`: one human-readable status line per run
//!
//! Each line, newline included, goes out in one `write_all` on a file opened
//! in append mode, so lines from concurrent runs never interleave mid-line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use dataverse_core::domain::{Source, Tier};
use thiserror::Error;

use crate::run::RunRecord;

pub const STATUS_LOG_FILE: &str = "pipeline_runs.log";
pub const RECORDS_FILE: &str = "run_records.jsonl";

const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("run log I/O error on {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("failed to encode run record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only sink for run records.
#[derive(Debug, Clone)]
pub struct RunLogger {
    dir: PathBuf,
}

impl RunLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    pub fn status_log_path(&self) -> PathBuf {
        self.dir.join(STATUS_LOG_FILE)
    }

    /// Persist a finished run. Also emits a tracing event at info (success)
    /// or error (failure) so the run shows up on the console.
    pub fn record(&self, record: &RunRecord) -> Result<(), RunLogError> {
        let json = serde_json::to_string(record)?;
        let line = format_status_line(record);

        fs::create_dir_all(&self.dir).map_err(|error| RunLogError::Io {
            path: self.dir.clone(),
            error,
        })?;
        append_line(&self.records_path(), &json)?;
        append_line(&self.status_log_path(), &line)?;

        if record.is_success() {
            tracing::info!(
                run_id = %record.run_id,
                source = %record.source,
                stage = %record.stage,
                rows = record.rows_written,
                dropped = record.dropped_records,
                duration_ms = record.duration_ms,
                "run succeeded"
            );
        } else {
            tracing::error!(
                run_id = %record.run_id,
                source = %record.source,
                stage = %record.stage,
                detail = record.error_detail.as_deref().unwrap_or(""),
                duration_ms = record.duration_ms,
                "run failed"
            );
        }
        Ok(())
    }

    /// Read back every record. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<RunRecord>, RunLogError> {
        let path = self.records_path();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(RunLogError::Io { path, error }),
        };

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|error| RunLogError::Io {
                path: path.clone(),
                error,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "skipping malformed run record");
                }
            }
        }
        Ok(records)
    }

    /// Most recent records first, optionally for one source.
    pub fn recent(
        &self,
        source: Option<Source>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RunLogError> {
        let mut records = self.read_all()?;
        records.retain(|r| source.map_or(true, |s| r.source == s));
        records.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        records.truncate(limit);
        Ok(records)
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), RunLogError> {
    let io_err = |error| RunLogError::Io {
        path: path.to_path_buf(),
        error,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(format!("{line}\n").as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)
}

/// Component name shown in the status log, e.g. `crypto_extractor`.
pub fn component_name(source: Source, stage: Tier) -> String {
    let role = match stage {
        Tier::Bronze => "extractor",
        Tier::Silver => "transformer",
        Tier::Gold => "aggregator",
    };
    format!("{source}_{role}")
}

/// `2024-03-01 12:00:00 | INFO | crypto_extractor | ✅ ...`
pub fn format_status_line(record: &RunRecord) -> String {
    let ts = record.finished_at.format(STATUS_TIME_FORMAT);
    let component = component_name(record.source, record.stage);
    if record.is_success() {
        let path = record
            .snapshot_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let mut msg = format!(
            "✅ {} rows written to {path} in {:.2}s",
            record.rows_written,
            record.duration_ms as f64 / 1000.0
        );
        if record.partial {
            msg.push_str(&format!(" ({} records dropped)", record.dropped_records));
        }
        if record.reused {
            msg.push_str(" (unchanged)");
        }
        format!("{ts} | INFO | {component} | {msg}")
    } else {
        let detail = record
            .error_detail
            .as_deref()
            .unwrap_or("unknown error")
            .replace('\n', " ");
        format!("{ts} | ERROR | {component} | ❌ Run {} failed: {detail}", record.run_id)
    }
}
