//! Filesystem primitives the layered writer needs.
//!
//! Kept behind a trait so tests can inject failures mid-write.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub trait StorageBackend {
    fn exists(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create or truncate `path`, write all bytes and flush them to disk.
    fn write_new(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Move a complete file from `from` to `to` without ever replacing `to`.
    /// Fails with `io::ErrorKind::AlreadyExists` when `to` is present.
    fn publish(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl StorageBackend for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn write_new(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    /// `hard_link` refuses an existing target, unlike `rename`.
    fn publish(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::hard_link(from, to)?;
        if let Err(error) = fs::remove_file(from) {
            tracing::warn!(path = %from.display(), %error, "published, but temporary file remains");
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
