//! Cooperative single-writer lock over a browser profile directory.
//!
//! The lock is a marker file created with `create_new`, so exactly one
//! process wins the race. The file holds the owner's pid for diagnostics.

use std::fs::OpenOptions;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wadriver_core::paths::LOCK_FILE_NAME;
use wadriver_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct ProfileLock {
    path: PathBuf,
    poll_interval: Duration,
}

impl ProfileLock {
    pub fn new(path: PathBuf, poll_interval: Duration) -> Self {
        Self {
            path,
            poll_interval,
        }
    }

    /// Lock guarding `profile_dir`, stored inside it.
    pub fn for_profile(profile_dir: &Path, poll_interval: Duration) -> Self {
        Self::new(profile_dir.join(LOCK_FILE_NAME), poll_interval)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the marker if nobody holds it. Never waits.
    pub fn try_acquire(&self) -> Result<bool> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(e) = write!(file, "{}", std::process::id()) {
                    warn!(path = %self.path.display(), error = %e, "Failed to write lock owner pid");
                }
                Ok(true)
            }
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll for the marker until `timeout` elapses. Returns `false` on timeout.
    pub async fn acquire(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire()? {
                debug!(path = %self.path.display(), "Profile lock acquired");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            debug!(owner = ?self.owner_pid(), "Profile lock busy, waiting");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Acquire and wrap in a guard that releases on drop.
    pub async fn lock(&self, timeout: Duration) -> Result<LockGuard> {
        if self.acquire(timeout).await? {
            return Ok(LockGuard {
                lock: self.clone(),
                released: false,
            });
        }
        let owner = self
            .owner_pid()
            .map(|pid| format!(" (held by pid {})", pid))
            .unwrap_or_default();
        Err(Error::LockContention(format!(
            "Profile is in use by another process{}; gave up after {}s",
            owner,
            timeout.as_secs()
        )))
    }

    /// Remove the marker. Idempotent.
    pub fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Profile lock released"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove lock file"),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.path.exists()
    }

    pub fn owner_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Remove a marker left behind by a crashed process. Returns whether one
    /// existed.
    pub fn force_clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        info!(path = %self.path.display(), owner = ?self.owner_pid(), "Clearing profile lock");
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Held lock; releases the marker when dropped.
#[derive(Debug)]
pub struct LockGuard {
    lock: ProfileLock,
    released: bool,
}

impl LockGuard {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.lock.release();
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
