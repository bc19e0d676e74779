//! Layered writer: publishes one immutable snapshot per call.
//!
//! Bytes are encoded in memory, written to a temporary file unique to the
//! call and then linked into place with a primitive that never replaces an
//! existing target. A reader sees either the complete artifact or nothing.
//! When two writers race for one path, the loser compares content hashes the
//! same way an up-front existence check does. Any failure removes the
//! temporary file.

use super::backend::{LocalFs, StorageBackend};
use super::layout::snapshot_path;
use super::tabular::{encode_csv, encode_parquet, Tabular};
use crate::domain::{Snapshot, SnapshotFormat, Source, Tier};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("refusing to write an empty {0} table")]
    EmptyTable(Source),

    #[error("{table} data cannot be written to the {requested} tier")]
    TierMismatch { table: Tier, requested: Tier },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage error at {path}: {error}")]
    Storage {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("{path} already exists with different content")]
    Collision { path: PathBuf },
}

fn storage(path: &Path) -> impl FnOnce(io::Error) -> WriteError + '_ {
    move |error| WriteError::Storage {
        path: path.to_path_buf(),
        error,
    }
}

pub struct LayeredWriter<B: StorageBackend = LocalFs> {
    root: PathBuf,
    backend: B,
}

impl LayeredWriter<LocalFs> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(root, LocalFs)
    }
}

impl<B: StorageBackend> LayeredWriter<B> {
    pub fn with_backend(root: impl Into<PathBuf>, backend: B) -> Self {
        Self {
            root: root.into(),
            backend,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publish `table` at `tier`.
    ///
    /// Writing identical content to an existing path is a no-op that returns
    /// the existing snapshot with `reused = true`. Different content at the
    /// same path is a `Collision`.
    pub fn write<T: Tabular + ?Sized>(&self, table: &T, tier: Tier) -> Result<Snapshot, WriteError> {
        if table.tier() != tier {
            return Err(WriteError::TierMismatch {
                table: table.tier(),
                requested: tier,
            });
        }
        let source = table.source();
        if table.row_count() == 0 {
            return Err(WriteError::EmptyTable(source));
        }

        let format = tier.format();
        let bytes = match format {
            SnapshotFormat::Csv => encode_csv(table)?,
            SnapshotFormat::Parquet => encode_parquet(table)?,
        };
        let content_hash = blake3::hash(&bytes).to_hex().to_string();

        let taken_at = table.timestamp();
        let path = self.root.join(snapshot_path(tier, source, taken_at));
        let snapshot = |reused| Snapshot {
            tier,
            source,
            path: path.clone(),
            format,
            row_count: table.row_count(),
            content_hash: content_hash.clone(),
            taken_at,
            reused,
        };

        if self.backend.exists(&path) {
            self.check_existing(&path, &content_hash)?;
            tracing::info!(%tier, %source, path = %path.display(), "identical snapshot exists, skipping write");
            return Ok(snapshot(true));
        }

        if let Some(dir) = path.parent() {
            self.backend.create_dir_all(dir).map_err(storage(dir))?;
        }

        let tmp = tmp_path(&path, format);
        let published = self
            .backend
            .write_new(&tmp, &bytes)
            .map_err(storage(&tmp))
            .and_then(|()| match self.backend.publish(&tmp, &path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(storage(&path)(e)),
            });

        match published {
            Ok(true) => {}
            Ok(false) => {
                let _ = self.backend.remove(&tmp);
                self.check_existing(&path, &content_hash)?;
                tracing::info!(%tier, %source, path = %path.display(), "identical snapshot published concurrently");
                return Ok(snapshot(true));
            }
            Err(e) => {
                let _ = self.backend.remove(&tmp);
                tracing::error!(%tier, %source, error = %e, "snapshot write failed");
                return Err(e);
            }
        }

        tracing::info!(
            %tier,
            %source,
            rows = table.row_count(),
            path = %path.display(),
            "snapshot published"
        );
        Ok(snapshot(false))
    }

    /// `Ok` when the file at `path` already holds `content_hash`.
    fn check_existing(&self, path: &Path, content_hash: &str) -> Result<(), WriteError> {
        let existing = self.backend.read(path).map_err(storage(path))?;
        if blake3::hash(&existing).to_hex().as_str() == content_hash {
            Ok(())
        } else {
            Err(WriteError::Collision {
                path: path.to_path_buf(),
            })
        }
    }
}

/// `{target}.{ext}.{pid}-{seq}.tmp`; never parsed as a snapshot name.
fn tmp_path(path: &Path, format: SnapshotFormat) -> PathBuf {
    let seq = TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!(
        "{}.{}-{seq}.tmp",
        format.extension(),
        std::process::id()
    ))
}
