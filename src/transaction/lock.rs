//! One writer per project root.
//!
//! Threads of this process are excluded through a flag shared by every
//! manager on the same root; other processes through a lock file created
//! with `create_new`.

use crate::errors::ApplyError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

const LOCK_FILE_NAME: &str = "lock";

type Held = Arc<Mutex<bool>>;

fn registry() -> &'static Mutex<HashMap<PathBuf, Held>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Held>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

#[derive(Debug, Clone)]
pub struct ProjectLock {
    held: Held,
    lock_file: PathBuf,
}

impl ProjectLock {
    /// Lock for the project whose state lives in `state_dir`.
    pub fn new(state_dir: &Path) -> Self {
        let held = registry()
            .lock()
            .entry(state_dir.to_path_buf())
            .or_default()
            .clone();
        Self {
            held,
            lock_file: state_dir.join(LOCK_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_file
    }

    /// Take the lock without waiting.
    pub fn acquire(&self, tx_id: &str) -> Result<LockGuard, ApplyError> {
        {
            let mut held = self.held.lock();
            if *held {
                return Err(ApplyError::Locked {
                    lock: self.lock_file.clone(),
                });
            }
            *held = true;
        }

        match self.create_lock_file(tx_id) {
            Ok(()) => {
                tracing::debug!(lock = %self.lock_file.display(), tx = tx_id, "acquired project lock");
                Ok(LockGuard {
                    held: Arc::clone(&self.held),
                    lock_file: self.lock_file.clone(),
                })
            }
            Err(error) => {
                *self.held.lock() = false;
                if error.kind() == io::ErrorKind::AlreadyExists {
                    Err(ApplyError::Locked {
                        lock: self.lock_file.clone(),
                    })
                } else {
                    Err(ApplyError::Io {
                        path: self.lock_file.clone(),
                        source: error,
                    })
                }
            }
        }
    }

    fn create_lock_file(&self, tx_id: &str) -> io::Result<()> {
        if let Some(parent) = self.lock_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_file)?;
        writeln!(file, "{} {}", std::process::id(), tx_id)
    }
}

/// Releases the lock on drop.
#[derive(Debug)]
#[must_use = "the lock is released when the guard is dropped"]
pub struct LockGuard {
    held: Held,
    lock_file: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.lock_file) {
            tracing::warn!(lock = %self.lock_file.display(), %error, "could not remove lock file");
        }
        *self.held.lock() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = TempDir::new().unwrap();
        let lock = ProjectLock::new(dir.path());
        let other = ProjectLock::new(dir.path());

        let guard = lock.acquire("tx-1").unwrap();
        assert!(lock.path().exists());
        assert!(matches!(other.acquire("tx-2"), Err(ApplyError::Locked { .. })));

        drop(guard);
        assert!(!lock.path().exists());
        let _again = other.acquire("tx-2").unwrap();
    }

    #[test]
    fn foreign_lock_file_blocks() {
        let dir = TempDir::new().unwrap();
        let lock = ProjectLock::new(dir.path());
        fs::write(lock.path(), "4242 tx-other\n").unwrap();

        assert!(matches!(lock.acquire("tx-1"), Err(ApplyError::Locked { .. })));
        fs::remove_file(lock.path()).unwrap();
        assert!(lock.acquire("tx-1").is_ok());
    }
}
