//! Per `(target, scope)` sync locks: an in-process set for threads of one
//! invocation plus an advisory file lock for other processes.

use crate::error::SyncError;
use fs4::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Hands out non-blocking locks under `<state root>/locks/`.
#[derive(Debug, Clone)]
pub struct SyncLocks {
    dir: PathBuf,
    held: Arc<Mutex<BTreeSet<String>>>,
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    file: File,
    held: Arc<Mutex<BTreeSet<String>>>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        self.held.lock().remove(&self.key);
        debug!(key = %self.key, "Released sync lock");
    }
}

fn contention(target: &str, scope: &str) -> SyncError {
    SyncError::LockContention {
        target: target.to_string(),
        scope: scope.to_string(),
    }
}

impl SyncLocks {
    pub fn new(state_root: &Path) -> Self {
        Self {
            dir: state_root.join("locks"),
            held: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn lock_path(&self, target: &str, scope: &str) -> PathBuf {
        self.dir.join(format!("{target}-{scope}.lock"))
    }

    /// Takes the lock or fails immediately with [`SyncError::LockContention`].
    pub fn try_acquire(&self, target: &str, scope: &str) -> Result<LockGuard, SyncError> {
        let key = format!("{target}:{scope}");
        if !self.held.lock().insert(key.clone()) {
            return Err(contention(target, scope));
        }

        let opened = fs::create_dir_all(&self.dir).and_then(|()| {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(self.lock_path(target, scope))
        });
        let file = match opened {
            Ok(file) => file,
            Err(e) => {
                self.held.lock().remove(&key);
                return Err(e.into());
            }
        };
        if let Err(e) = file.try_lock_exclusive() {
            self.held.lock().remove(&key);
            return Err(if e.kind() == ErrorKind::WouldBlock {
                contention(target, scope)
            } else {
                e.into()
            });
        }

        debug!(key = %key, "Acquired sync lock");
        Ok(LockGuard {
            key,
            file,
            held: Arc::clone(&self.held),
        })
    }

    /// True while some thread of this process holds the pair.
    pub fn is_held(&self, target: &str, scope: &str) -> bool {
        self.held.lock().contains(&format!("{target}:{scope}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let locks = SyncLocks::new(tmp.path());

        let guard = locks.try_acquire("codex", "all").unwrap();
        let err = locks.try_acquire("codex", "all").unwrap_err();
        assert!(err.is_busy());
        assert!(locks.try_acquire("gemini", "all").is_ok());

        drop(guard);
        assert!(!locks.is_held("codex", "all"));
        assert!(locks.try_acquire("codex", "all").is_ok());
    }

    #[test]
    fn separate_managers_contend_through_the_lock_file() {
        let tmp = tempfile::tempdir().unwrap();
        let a = SyncLocks::new(tmp.path());
        let b = SyncLocks::new(tmp.path());

        let _guard = a.try_acquire("opencode", "user").unwrap();
        assert!(b.try_acquire("opencode", "user").unwrap_err().is_busy());
        assert!(tmp.path().join("locks/opencode-user.lock").exists());
    }
}
