//! The public engine: every operation opens its own session, does its work
//! and tears the session down again, returning an [`OperationResult`].

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use wadriver_browser::{BrowserEngine, BrowserLauncher, ChromeLauncher, LaunchOptions};
use wadriver_core::{
    AuthPayload, ChatSummary, Config, EngineStatus, Error, OperationResult, Paths, Result,
    ScanPayload, SendPayload, SendRequest,
};

use crate::auth::{write_artifact, AuthOutcome, Authenticator};
use crate::dispatch::Dispatcher;
use crate::extract::{Extractor, ScanOptions};
use crate::lock::ProfileLock;
use crate::session::Session;

/// Cheap to clone; clones share the lock and the last-known login state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,
    paths: Paths,
    launcher: Arc<dyn BrowserLauncher>,
    lock: ProfileLock,
    /// Login outcome of the last operation that got that far.
    connected: Mutex<Option<bool>>,
}

impl Engine {
    pub fn new(config: Config, paths: Paths) -> Self {
        Self::with_launcher(config, paths, Arc::new(ChromeLauncher))
    }

    pub fn with_launcher(config: Config, paths: Paths, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let lock = ProfileLock::for_profile(
            &config.profile_dir(&paths),
            config.lock.poll_interval(),
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                paths,
                launcher,
                lock,
                connected: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn paths(&self) -> &Paths {
        &self.inner.paths
    }

    pub fn profile_lock(&self) -> &ProfileLock {
        &self.inner.lock
    }

    /// Scan the chat list. Empty or absent `keywords` returns every row.
    pub async fn check_messages(
        &self,
        keywords: Option<&[String]>,
        check_archived: bool,
        limit: usize,
    ) -> OperationResult<ScanPayload> {
        let options = ScanOptions {
            keywords: keywords.map(<[String]>::to_vec).unwrap_or_default(),
            limit,
            include_archived: check_archived,
        };
        let result = self.scan(&options).await;
        if let Err(e) = &result {
            error!(error = %e, "Chat scan failed");
        }
        OperationResult::from_result(result.map(ScanPayload::new))
    }

    pub async fn send_message(&self, target: &str, message: &str) -> OperationResult<SendPayload> {
        let request = SendRequest::new(target, message);
        let result = self.send(&request).await;
        if let Err(e) = &result {
            error!(error = %e, "Send failed");
        }
        OperationResult::from_result(result.map(|status| SendPayload {
            status: Some(status),
        }))
    }

    /// Send to the configured admin number.
    pub async fn send_alert(&self, message: &str) -> OperationResult<SendPayload> {
        match self.inner.config.admin_number() {
            Some(admin) => {
                let admin = admin.to_string();
                self.send_message(&admin, message).await
            }
            None => OperationResult::failed(
                &Error::Config("No admin number configured".to_string()),
                SendPayload::default(),
            ),
        }
    }

    /// Open the profile and log in (pairing if needed), then close.
    pub async fn authenticate(&self) -> OperationResult<AuthPayload> {
        let result = self.pair().await;
        if let Err(e) = &result {
            error!(error = %e, "Login failed");
        }
        OperationResult::from_result(result)
    }

    /// Never touches the browser or the lock.
    pub fn get_status(&self) -> EngineStatus {
        let config = &self.inner.config;
        EngineStatus {
            enabled: config.engine.enabled,
            connected: self.connected(),
            admin_number: config.admin_number().map(|s| s.to_string()),
            session_dir: config.profile_dir(&self.inner.paths).display().to_string(),
            locked: self.inner.lock.is_locked(),
        }
    }

    /// Remove a lock marker left by a dead process.
    pub fn unlock(&self) -> Result<bool> {
        self.inner.lock.force_clear()
    }

    fn connected(&self) -> Option<bool> {
        *self
            .inner
            .connected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_connected(&self, value: bool) {
        *self
            .inner
            .connected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(value);
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.inner.config.engine.enabled {
            Ok(())
        } else {
            Err(Error::Disabled(
                "WhatsApp automation is disabled (set engine.enabled or WADRIVER_ENABLED)"
                    .to_string(),
            ))
        }
    }

    fn launch_options(&self) -> LaunchOptions {
        let browser = &self.inner.config.browser;
        LaunchOptions {
            engine: BrowserEngine::from_str(&browser.engine),
            profile_dir: self.inner.config.profile_dir(&self.inner.paths),
            headless: browser.headless,
            user_agent: Some(browser.user_agent.clone()),
            extra_args: browser.extra_args.clone(),
            navigation_timeout: Duration::from_secs(browser.navigation_timeout_secs),
        }
    }

    /// Lock, launch, load the client and log in. On any failure past the
    /// lock the session is closed before returning.
    async fn open_session(&self) -> Result<(Session, AuthOutcome)> {
        let config = &self.inner.config;
        let mut session = Session::open(
            self.inner.launcher.as_ref(),
            &self.inner.lock,
            &self.launch_options(),
            config.lock.acquire_timeout(),
        )
        .await?;

        match self.login(&session).await {
            Ok(outcome) => {
                session.authenticated = true;
                self.set_connected(true);
                Ok((session, outcome))
            }
            Err(e) => {
                if matches!(e, Error::Authentication(_)) {
                    self.set_connected(false);
                }
                session.close().await;
                Err(e)
            }
        }
    }

    async fn login(&self, session: &Session) -> Result<AuthOutcome> {
        let config = &self.inner.config;
        let page = session.page();
        info!(url = %config.engine.base_url, "Opening WhatsApp Web");
        page.navigate(&config.engine.base_url).await?;

        tokio::time::sleep(config.auth.render_settle()).await;
        if config.browser.debug_screenshots {
            let path = self.inner.paths.page_loaded_png();
            match page.screenshot(None).await {
                Ok(png) => {
                    if let Err(e) = write_artifact(&path, &png) {
                        warn!(error = %e, "Failed to save page screenshot");
                    }
                }
                Err(e) => warn!(error = %e, "Page screenshot failed"),
            }
        }

        Authenticator::new(page, &config.auth, &self.inner.paths)
            .ensure_authenticated()
            .await
    }

    async fn pair(&self) -> Result<AuthPayload> {
        self.ensure_enabled()?;
        let (session, outcome) = self.open_session().await?;
        session.close().await;
        Ok(AuthPayload {
            authenticated: true,
            challenges_presented: outcome.challenges_presented,
        })
    }

    async fn scan(&self, options: &ScanOptions) -> Result<Vec<ChatSummary>> {
        self.ensure_enabled()?;
        let (session, _) = self.open_session().await?;
        let config = &self.inner.config;
        let result = Extractor::new(session.page(), &config.scan, &config.engine.base_url)
            .scan(options)
            .await;
        session.close().await;
        result
    }

    async fn send(&self, request: &SendRequest) -> Result<wadriver_core::SendStatus> {
        self.ensure_enabled()?;
        let (session, _) = self.open_session().await?;
        let config = &self.inner.config;
        let result = Dispatcher::new(session.page(), &config.send, &config.engine.base_url)
            .send(request)
            .await;
        if result.is_err() {
            self.save_error_screenshot(&session).await;
        }
        session.close().await;
        result
    }

    async fn save_error_screenshot(&self, session: &Session) {
        let path = self.inner.paths.send_error_png();
        let saved = match session.page().screenshot(None).await {
            Ok(png) => write_artifact(&path, &png),
            Err(e) => Err(e),
        };
        match saved {
            Ok(()) => info!(path = %path.display(), "Saved screenshot of the failed send"),
            Err(e) => warn!(error = %e, "Could not save error screenshot"),
        }
    }
}
