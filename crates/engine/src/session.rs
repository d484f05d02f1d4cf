//! One browser session over the persistent profile, held under the lock.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use wadriver_browser::{BrowserHandle, BrowserLauncher, LaunchOptions, PageDriver};
use wadriver_core::Result;

use crate::lock::{LockGuard, ProfileLock};

/// A live browser on the profile plus the lock that makes it exclusive.
///
/// Call [`Session::close`] when done. If the session is dropped instead,
/// the lock guard still removes the marker and the browser handle kills its
/// process.
pub struct Session {
    browser: Box<dyn BrowserHandle>,
    lock: Option<LockGuard>,
    profile_dir: PathBuf,
    pub authenticated: bool,
}

impl Session {
    /// Take the profile lock, then launch. The lock is released again if the
    /// launch fails.
    pub async fn open(
        launcher: &dyn BrowserLauncher,
        lock: &ProfileLock,
        options: &LaunchOptions,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let guard = lock.lock(lock_timeout).await?;
        let browser = launcher.launch(options).await?;
        debug!(profile = %options.profile_dir.display(), "Session opened");
        Ok(Self {
            browser,
            lock: Some(guard),
            profile_dir: options.profile_dir.clone(),
            authenticated: false,
        })
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.browser.page()
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Close the browser, then release the lock.
    pub async fn close(mut self) {
        self.browser.close().await;
        if let Some(guard) = self.lock.take() {
            guard.release();
        }
        debug!(profile = %self.profile_dir.display(), "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, FakePage};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;
    use wadriver_browser::BrowserEngine;
    use wadriver_core::ErrorKind;

    fn options(dir: &Path) -> LaunchOptions {
        LaunchOptions {
            engine: BrowserEngine::Chrome,
            profile_dir: dir.to_path_buf(),
            headless: true,
            user_agent: None,
            extra_args: Vec::new(),
            navigation_timeout: Duration::from_secs(90),
        }
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let dir = TempDir::new().unwrap();
        let launcher = FakeLauncher::new(FakePage::logged_in());
        let lock = ProfileLock::for_profile(dir.path(), Duration::from_millis(10));

        let session = Session::open(launcher.as_ref(), &lock, &options(dir.path()), Duration::ZERO)
            .await
            .unwrap();
        assert!(lock.is_locked());
        assert!(!session.authenticated);
        session.close().await;

        assert!(!lock.is_locked());
        assert!(launcher.was_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_session_is_refused() {
        let dir = TempDir::new().unwrap();
        let launcher = FakeLauncher::new(FakePage::logged_in());
        let lock = ProfileLock::for_profile(dir.path(), Duration::from_secs(1));
        let opts = options(dir.path());

        let first = Session::open(launcher.as_ref(), &lock, &opts, Duration::ZERO)
            .await
            .unwrap();
        let second = Session::open(launcher.as_ref(), &lock, &opts, Duration::from_secs(60)).await;
        assert_eq!(second.err().map(|e| e.kind()), Some(ErrorKind::LockContention));
        assert_eq!(launcher.launch_count(), 1);
        first.close().await;
    }

    #[tokio::test]
    async fn test_failed_launch_releases_lock() {
        let dir = TempDir::new().unwrap();
        let launcher = FakeLauncher::new(FakePage::new());
        launcher.fail_launch.store(true, Ordering::SeqCst);
        let lock = ProfileLock::for_profile(dir.path(), Duration::from_millis(10));

        let result = Session::open(launcher.as_ref(), &lock, &options(dir.path()), Duration::ZERO).await;
        assert!(result.is_err());
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let dir = TempDir::new().unwrap();
        let launcher = FakeLauncher::new(FakePage::logged_in());
        let lock = ProfileLock::for_profile(dir.path(), Duration::from_millis(10));

        let session = Session::open(launcher.as_ref(), &lock, &options(dir.path()), Duration::ZERO)
            .await
            .unwrap();
        drop(session);
        assert!(!lock.is_locked());
    }
}
