//! Chrome launcher for persistent-profile sessions.
//!
//! Each launch starts a fresh browser process against the configured user
//! data directory, so login state survives between operations while the
//! process itself does not.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::Instant;
use tokio::process::{Child, Command};
use tracing::{debug, info};
use wadriver_core::{Error, Result};

use crate::cdp::CdpClient;
use crate::driver::{BrowserHandle, BrowserLauncher, LaunchOptions, PageDriver};
use crate::page::CdpPage;

const READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Supported browser engines (both speak CDP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    Chrome,
    Edge,
}

impl BrowserEngine {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }
}

/// A launched browser process with a CDP connection to its first page.
pub struct ChromeSession {
    chrome_process: Child,
    page: CdpPage,
    closed: bool,
}

#[async_trait]
impl BrowserHandle for ChromeSession {
    fn page(&self) -> &dyn PageDriver {
        &self.page
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.page.cdp().close_browser().await {
            debug!(error = %e, "Browser.close failed; killing process");
        }
        let _ = self.chrome_process.kill().await;
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let _ = self.chrome_process.start_kill();
    }
}

/// Launches Chrome/Edge found on the host.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserHandle>> {
        let engine = options.engine;
        let browser_path = find_browser_binary(engine).ok_or_else(|| {
            Error::Browser(format!("{} not found. Please install it.", engine.name()))
        })?;

        std::fs::create_dir_all(&options.profile_dir)?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(
            debug_port,
            &options.profile_dir,
            options.headless,
            &options.extra_args,
        );

        info!(
            port = debug_port,
            headless = options.headless,
            browser = engine.name(),
            profile = %options.profile_dir.display(),
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", engine.name(), e)))?;

        let version = wait_for_cdp_ready(debug_port, READY_TIMEOUT).await?;
        debug!(browser = %version.browser, "Debugging endpoint ready");

        // Page.* commands need the page target, not the browser target.
        let page_ws_url = page_target_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url).await?;
        cdp.enable(&["Page", "Runtime", "DOM", "Network"]).await?;
        if let Some(ua) = options.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
            cdp.set_user_agent(ua).await?;
        }

        info!(ws_url = %page_ws_url, "CDP connection established (page target)");

        Ok(Box::new(ChromeSession {
            chrome_process: child,
            page: CdpPage::new(cdp, options.navigation_timeout),
            closed: false,
        }))
    }
}

/// Build Chromium command line arguments for a persistent-profile launch.
fn build_browser_args(
    debug_port: u16,
    user_data_dir: &Path,
    headless: bool,
    extra_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-sync".to_string(),
        "--password-store=basic".to_string(),
        "--window-size=1280,800".to_string(),
    ];
    if cfg!(target_os = "linux") {
        // Containers rarely allow the setuid sandbox.
        args.push("--no-sandbox".to_string());
        args.push("--disable-setuid-sandbox".to_string());
    }
    if headless {
        args.push("--headless=new".to_string());
    }
    args.extend(extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

#[cfg(target_os = "macos")]
const CHROME_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];
#[cfg(target_os = "macos")]
const EDGE_PATHS: &[&str] = &["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"];

#[cfg(windows)]
const CHROME_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];
#[cfg(windows)]
const EDGE_PATHS: &[&str] = &[
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", windows)))]
const CHROME_PATHS: &[&str] = &["/usr/bin/google-chrome", "/usr/bin/chromium", "/snap/bin/chromium"];
#[cfg(not(any(target_os = "macos", windows)))]
const EDGE_PATHS: &[&str] = &["/usr/bin/microsoft-edge"];

impl BrowserEngine {
    /// Executable names looked up on `PATH`.
    fn commands(&self) -> &'static [&'static str] {
        match self {
            Self::Chrome => &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"],
            Self::Edge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
        }
    }

    fn install_paths(&self) -> &'static [&'static str] {
        match self {
            Self::Chrome => CHROME_PATHS,
            Self::Edge => EDGE_PATHS,
        }
    }
}

/// `PATH` first, then the usual install locations.
pub fn find_browser_binary(engine: BrowserEngine) -> Option<String> {
    engine
        .commands()
        .iter()
        .find_map(|cmd| which::which(cmd).ok())
        .map(|path| path.display().to_string())
        .or_else(|| {
            engine
                .install_paths()
                .iter()
                .find(|path| Path::new(path).exists())
                .map(|path| path.to_string())
        })
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

/// `/json/version` response.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "Browser", default)]
    browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    ws_url: Option<String>,
}

/// One entry of `/json/list`.
#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    ws_url: Option<String>,
}

async fn fetch<T: DeserializeOwned>(url: &str) -> Option<T> {
    reqwest::get(url).await.ok()?.json::<T>().await.ok()
}

/// Poll `/json/version` until the debugging endpoint answers.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<VersionInfo> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(version) = fetch::<VersionInfo>(&url).await {
            if version.ws_url.is_some() {
                return Ok(version);
            }
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "Browser debugging endpoint not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// The first page target may appear shortly after the endpoint does.
async fn page_target_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);
    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        if let Some(ws_url) = fetch::<Vec<TargetInfo>>(&url)
            .await
            .and_then(|targets| first_page_ws_url(&targets))
        {
            return Ok(ws_url);
        }
    }
    Err(Error::Browser("No page target found".to_string()))
}

fn first_page_ws_url(targets: &[TargetInfo]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.kind == "page")
        .find_map(|t| t.ws_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_browser_engine_from_str() {
        assert_eq!(BrowserEngine::from_str("chrome"), BrowserEngine::Chrome);
        assert_eq!(BrowserEngine::from_str("Chrome"), BrowserEngine::Chrome);
        assert_eq!(BrowserEngine::from_str("edge"), BrowserEngine::Edge);
        assert_eq!(BrowserEngine::from_str("msedge"), BrowserEngine::Edge);
        assert_eq!(BrowserEngine::from_str("unknown"), BrowserEngine::Chrome); // default
    }

    #[test]
    fn test_build_browser_args_persistent_profile() {
        let dir = PathBuf::from("/tmp/profile");
        let args = build_browser_args(9222, &dir, true, &["--lang=en".to_string()]);
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--lang=en".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        let headed = build_browser_args(9222, &dir, false, &[]);
        assert!(!headed.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_first_page_ws_url_skips_workers() {
        let targets: Vec<TargetInfo> = serde_json::from_value(json!([
            {"type": "service_worker", "webSocketDebuggerUrl": "ws://sw"},
            {"type": "page", "url": "about:blank"},
            {"type": "page", "webSocketDebuggerUrl": "ws://page"},
        ]))
        .unwrap();
        assert_eq!(first_page_ws_url(&targets).as_deref(), Some("ws://page"));
        assert_eq!(first_page_ws_url(&[]), None);
    }

    #[test]
    fn test_version_info_fields() {
        let version: VersionInfo = serde_json::from_value(json!({
            "Browser": "Chrome/126.0.6478.126",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/x"
        }))
        .unwrap();
        assert_eq!(version.browser, "Chrome/126.0.6478.126");
        assert!(version.ws_url.is_some());
    }
}
