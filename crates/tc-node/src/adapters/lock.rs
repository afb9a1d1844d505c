//! # Data Directory Lock
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on Windows).

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from data directory locking
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file: {0}")]
    CreateFailed(io::Error),
    #[error("Data directory already in use (lock {path:?}, holder pid {pid:?})")]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },
    #[error("Failed to write PID to lock file: {0}")]
    WriteFailed(io::Error),
}

/// Exclusive lock on the node's data directory.
///
/// Held for the lifetime of the node so only one process extends and
/// publishes a given ledger. Released on drop.
pub struct DataDirLock {
    /// Kept open to hold the lock.
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DataDirLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Acquire the lock without waiting, creating `data_dir` if needed.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(data_dir).map_err(LockError::CreateFailed)?;
        let lock_path = data_dir.join(Self::LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(LockError::CreateFailed)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyLocked {
                pid: Self::read_existing_pid(&lock_path),
                path: lock_path,
            });
        }

        let pid = std::process::id();
        let mut locked_file = file;
        locked_file.set_len(0).map_err(LockError::WriteFailed)?;
        writeln!(locked_file, "{}", pid).map_err(LockError::WriteFailed)?;
        locked_file.sync_all().map_err(LockError::WriteFailed)?;

        tracing::info!("[tc] Acquired data directory lock {}", lock_path.display());
        Ok(Self {
            file: locked_file,
            path: lock_path,
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
