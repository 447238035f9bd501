//! Advisory file lock shared by every process that writes the store.
//!
//! The lock is a sibling file created with `create_new`, holding a random
//! owner token. A lock older than the staleness threshold is presumed
//! abandoned and reclaimed; otherwise acquisition retries with exponential
//! backoff until the timeout expires.

use crate::error::StoreError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    pub timeout: Duration,
    pub stale_after: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(120),
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(500),
        }
    }
}

/// A held lock. Released explicitly with [`release`](AdvisoryLock::release)
/// or, failing that, on drop.
#[derive(Debug)]
pub struct AdvisoryLock {
    path: PathBuf,
    token: String,
    released: bool,
}

impl AdvisoryLock {
    pub fn acquire(path: &Path, settings: &LockSettings) -> Result<Self, StoreError> {
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut backoff = settings.initial_backoff;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    if let Err(err) = file.write_all(token.as_bytes()) {
                        let _ = fs::remove_file(path);
                        return Err(StoreError::io(path, err));
                    }
                    tracing::debug!(lock = %path.display(), %token, "lock acquired");
                    return Ok(AdvisoryLock {
                        path: path.to_path_buf(),
                        token,
                        released: false,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(StoreError::io(path, err)),
            }

            if reclaim_if_stale(path, settings.stale_after)? {
                continue;
            }

            let waited = started.elapsed();
            if waited >= settings.timeout {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            thread::sleep(backoff.min(settings.timeout - waited));
            backoff = (backoff * 2).min(settings.max_backoff);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Remove the lock file if this holder still owns it.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), StoreError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let owner = match fs::read_to_string(&self.path) {
            Ok(owner) => owner,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(lock = %self.path.display(), "lock vanished before release");
                return Ok(());
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        if owner.trim() != self.token {
            tracing::warn!(
                lock = %self.path.display(),
                "lock was reclaimed by another writer, leaving it in place"
            );
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&self.path, err)),
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            tracing::warn!(error = %err, "failed to release store lock");
        }
    }
}

/// What a waiting writer saw of the current lock file.
#[derive(Debug, PartialEq, Eq)]
struct Observed {
    owner: String,
    modified: SystemTime,
}

/// `None` when the lock file is gone.
fn observe(path: &Path) -> Result<Option<Observed>, StoreError> {
    let read = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .and_then(|modified| Ok((modified, fs::read_to_string(path)?)));
    match read {
        Ok((modified, owner)) => Ok(Some(Observed { owner, modified })),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

/// Reclaim the lock at `path` when its file is older than `stale_after`.
/// Returns whether the caller should retry immediately.
fn reclaim_if_stale(path: &Path, stale_after: Duration) -> Result<bool, StoreError> {
    // Released between our attempt and the check.
    let Some(observed) = observe(path)? else {
        return Ok(true);
    };
    let age = SystemTime::now()
        .duration_since(observed.modified)
        .unwrap_or(Duration::ZERO);
    if age < stale_after {
        return Ok(false);
    }
    reclaim(path, &observed, age)
}

/// Move the observed stale lock aside and delete it. The file may have
/// changed hands between the observation and the rename; in that case it is
/// linked back unless yet another writer already holds the path.
fn reclaim(path: &Path, observed: &Observed, age: Duration) -> Result<bool, StoreError> {
    let tombstone = path.with_extension(format!("stale-{}", Uuid::new_v4()));
    match fs::rename(path, &tombstone) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(StoreError::io(path, err)),
    }

    let moved = observe(&tombstone);
    if !matches!(&moved, Ok(Some(current)) if current == observed) {
        let restored = fs::hard_link(&tombstone, path);
        let _ = fs::remove_file(&tombstone);
        match restored {
            Ok(()) => {
                tracing::debug!(lock = %path.display(), "lock changed hands before reclaim, restored");
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(lock = %path.display(), "lock changed hands twice during reclaim");
            }
            Err(err) => return Err(StoreError::io(path, err)),
        }
        moved?;
        return Ok(true);
    }

    tracing::warn!(lock = %path.display(), ?age, "reclaimed stale store lock");
    let _ = fs::remove_file(&tombstone);
    Ok(true)
}
