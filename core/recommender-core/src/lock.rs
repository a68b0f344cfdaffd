//! Advisory lock file guarding writes to the recommendation model.
//!
//! Any process that wants to change the model must hold this lock. The lock is
//! a plain file next to the model:
//!
//! ```text
//! extension-recommender.lock
//! ├── line 1: acquisition time (ms since epoch)
//! └── line 2: 32-character alphanumeric nonce
//! ```
//!
//! # Acquisition
//!
//! No exclusive-create primitive is assumed, so acquisition is write-then-verify:
//!
//! 1. Reclaim the lock if it is older than `stale_after` (its holder crashed).
//! 2. Poll until the lock file disappears or the deadline passes.
//! 3. Write a fresh timestamp + nonce.
//! 4. Sleep `settle_delay` so a writer that raced us can overwrite the file.
//! 5. Re-read the nonce. Ours → acquired. Someone else's → start over.
//!
//! This narrows the race between two writers that both saw "no lock" to the
//! gap between their existence check and their write. It is best-effort, not
//! linearizable.
//!
//! # Staleness
//!
//! Age comes from the timestamp line. A lock file whose contents cannot be
//! parsed falls back to its modification time, so garbage never blocks
//! writers for longer than `stale_after`.
//!
//! Holders are identified only by nonce, never by process id.

use fs_err as fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::fsutil;
use crate::model::now_ms;

pub const NONCE_LEN: usize = 32;

/// Timing knobs for the lock protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimings {
    /// A lock older than this is treated as abandoned.
    pub stale_after: Duration,
    /// Sleep between existence checks while someone else holds the lock.
    pub poll_interval: Duration,
    /// Wait between writing our nonce and verifying it.
    pub settle_delay: Duration,
}

impl Default for LockTimings {
    fn default() -> Self {
        LockTimings {
            stale_after: Duration::from_secs(30),
            poll_interval: Duration::from_millis(25),
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// Parsed contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockContents {
    pub acquired_at: i64,
    pub nonce: String,
}

impl LockContents {
    /// Parses `<timestamp>\n<nonce>`. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.split('\n');
        let (first, second) = (lines.next()?, lines.next()?);
        if lines.next().is_some() || first.is_empty() {
            return None;
        }
        let acquired_at = first.trim().parse().ok()?;
        Some(LockContents {
            acquired_at,
            nonce: second.to_string(),
        })
    }

    fn render(&self) -> String {
        format!("{}\n{}", self.acquired_at, self.nonce)
    }
}

/// Snapshot of the lock file for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    /// `None` when the file exists but could not be parsed.
    pub contents: Option<LockContents>,
    pub age: Duration,
    pub stale: bool,
}

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// The lock file for one storage directory.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    timings: LockTimings,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>, timings: LockTimings) -> Self {
        LockFile {
            path: path.into(),
            timings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timings(&self) -> LockTimings {
        self.timings
    }

    /// Tries to take the lock within `timeout`.
    ///
    /// Returns `None` if the deadline passed without a verified write. The
    /// returned guard releases the lock when dropped.
    pub fn acquire(&self, timeout: Duration) -> Option<LockGuard<'_>> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;

        while Instant::now() <= deadline {
            attempts += 1;
            if let Some(nonce) = self.try_acquire_once(deadline) {
                tracing::debug!(
                    path = %self.path.display(),
                    attempts,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Lock acquired"
                );
                return Some(LockGuard { lock: self, nonce });
            }
        }

        tracing::warn!(
            path = %self.path.display(),
            attempts,
            timeout_ms = timeout.as_millis() as u64,
            "Timed out acquiring lock"
        );
        None
    }

    fn try_acquire_once(&self, deadline: Instant) -> Option<String> {
        self.reclaim_if_stale();

        while fsutil::exists(&self.path) && Instant::now() < deadline {
            thread::sleep(self.timings.poll_interval);
        }
        if Instant::now() >= deadline {
            return None;
        }

        let nonce = generate_nonce();
        let contents = LockContents {
            acquired_at: now_ms(),
            nonce: nonce.clone(),
        };
        if let Err(e) = fsutil::write_atomic(&self.path, &contents.render()) {
            tracing::debug!(error = %e, path = %self.path.display(), "Lock write failed, retrying");
            thread::sleep(self.timings.poll_interval);
            return None;
        }

        thread::sleep(self.timings.settle_delay);

        match self.read_contents() {
            Some(current) if current.nonce == nonce => Some(nonce),
            _ => {
                tracing::debug!(path = %self.path.display(), "Lost lock race, retrying");
                None
            }
        }
    }

    /// Deletes the lock file. A missing file is not an error.
    pub fn release(&self) {
        match fsutil::remove_if_exists(&self.path) {
            Ok(true) => tracing::debug!(path = %self.path.display(), "Lock released"),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(error = %e, path = %self.path.display(), "Ignoring lock delete failure")
            }
        }
    }

    /// Deletes the lock if it is older than `stale_after`. Returns true if it
    /// was reclaimed.
    pub fn reclaim_if_stale(&self) -> bool {
        let Some(status) = self.status() else {
            return false;
        };
        if !status.stale {
            return false;
        }
        tracing::info!(
            path = %self.path.display(),
            age_ms = status.age.as_millis() as u64,
            "Reclaiming abandoned lock"
        );
        self.release();
        true
    }

    /// Current state of the lock file, or `None` if there is none.
    pub fn status(&self) -> Option<LockStatus> {
        let raw = fsutil::read_optional(&self.path)?;
        let contents = LockContents::parse(&raw);
        let age = match &contents {
            Some(c) => age_from_timestamp(c.acquired_at),
            None => self.age_from_mtime()?,
        };
        Some(LockStatus {
            stale: age > self.timings.stale_after,
            contents,
            age,
        })
    }

    fn read_contents(&self) -> Option<LockContents> {
        fsutil::read_optional(&self.path).and_then(|raw| LockContents::parse(&raw))
    }

    fn age_from_mtime(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default(),
        )
    }
}

fn age_from_timestamp(acquired_at: i64) -> Duration {
    let age_ms = now_ms().saturating_sub(acquired_at).max(0);
    Duration::from_millis(age_ms as u64)
}

/// Proof of lock ownership. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a LockFile,
    nonce: String,
}

impl LockGuard<'_> {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // A holder that outlived stale_after may have been reclaimed; the file
        // then belongs to someone else and must stay.
        match self.lock.read_contents() {
            Some(current) if current.nonce != self.nonce => {
                tracing::warn!(
                    path = %self.lock.path.display(),
                    "Lock was reclaimed while held; leaving the new holder's lock in place"
                );
            }
            _ => self.lock.release(),
        }
    }
}
