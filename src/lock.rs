//! File-based locking to keep one monitor per store directory.
//!
//! Uses flock-style advisory locking so a second blocktail instance
//! cannot tail into and sweep the same store concurrently. External
//! readers of the store are unaffected; they only ever see whole records.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Lock file name inside the store directory (hidden, so sweeps skip it).
const LOCK_NAME: &str = ".lock";

/// A guard holding the store's exclusive lock.
/// The lock is released when the guard is dropped.
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Acquire the exclusive lock for `store_dir`.
    ///
    /// Opens with create+read+write (no truncate) to avoid a TOCTOU race
    /// between file creation and lock acquisition.
    pub fn acquire(store_dir: &Path) -> Result<Self> {
        let lock_path = store_dir.join(LOCK_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another blocktail instance is already monitoring {}",
                store_dir.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}
