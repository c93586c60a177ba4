//! Per-target mutual exclusion for merge attempts
//!
//! Two layers: an async mutex per target inside the process, and, when a
//! lock directory is configured, an advisory file lock per target shared by
//! every process on the host. The in-process lock is always taken first, so
//! a process never contends with itself on the file.

use crate::error::{Error, Result};
use crate::routing::StoreLocator;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Identity of a target branch within one store
///
/// The same branch name in two different stores is two different targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    /// Store holding the merge requests
    pub locator: StoreLocator,
    /// Target branch
    pub target: String,
}

impl TargetKey {
    /// Build a key
    pub fn new(locator: StoreLocator, target: impl Into<String>) -> Self {
        Self {
            locator,
            target: target.into(),
        }
    }

    /// Lock file name; distinct keys always give distinct names
    fn file_name(&self) -> String {
        format!(
            "{}@{}.lock",
            escape(&self.target),
            escape(self.locator.as_str())
        )
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.target, self.locator)
    }
}

/// Keep `[A-Za-z0-9._-]`, percent-encode every other byte
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Proof that a target is held; dropping it releases the target
#[derive(Debug)]
pub struct TargetGuard {
    _local: OwnedMutexGuard<()>,
    _file: Option<File>,
}

/// Target locks, created on first use
///
/// Held for the whole of a merge attempt (and for a rejection), so a manual
/// `retry --now` and the periodic cycle can never merge into the same
/// target at once, whether they run in one process or two.
#[derive(Debug, Default)]
pub struct TargetLocks {
    slots: Mutex<HashMap<TargetKey, Arc<AsyncMutex<()>>>>,
    dir: Option<PathBuf>,
}

impl TargetLocks {
    /// Lock table; `dir` enables cross-process file locks
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            slots: Mutex::default(),
            dir,
        }
    }

    fn slot(&self, key: &TargetKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn open(&self, key: &TargetKey) -> Result<Option<File>> {
        let Some(ref dir) = self.dir else {
            return Ok(None);
        };
        let create = || -> std::io::Result<File> {
            std::fs::create_dir_all(dir)?;
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(dir.join(key.file_name()))
        };
        create()
            .map(Some)
            .map_err(|e| Error::from(e).context(format!("opening lock file for {key}")))
    }

    /// Wait for the target to become free
    pub async fn lock(&self, key: &TargetKey) -> Result<TargetGuard> {
        let local = self.slot(key).lock_owned().await;
        let file = match self.open(key)? {
            None => None,
            Some(file) if try_lock_file(&file, key)? => Some(file),
            Some(file) => {
                debug!(target = %key, "waiting for another process");
                let waited = tokio::task::spawn_blocking(move || file.lock().map(|()| file))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))?;
                Some(waited.map_err(|e| Error::from(e).context(format!("locking {key}")))?)
            }
        };
        Ok(TargetGuard {
            _local: local,
            _file: file,
        })
    }

    /// Take the target if nobody holds it
    pub fn try_lock(&self, key: &TargetKey) -> Result<Option<TargetGuard>> {
        let Ok(local) = self.slot(key).try_lock_owned() else {
            return Ok(None);
        };
        let file = match self.open(key)? {
            None => None,
            Some(file) if try_lock_file(&file, key)? => Some(file),
            Some(_) => return Ok(None),
        };
        Ok(Some(TargetGuard {
            _local: local,
            _file: file,
        }))
    }
}

fn try_lock_file(file: &File, key: &TargetKey) -> Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(TryLockError::WouldBlock) => Ok(false),
        Err(TryLockError::Error(e)) => {
            Err(Error::from(e).context(format!("locking {key}")))
        }
    }
}
