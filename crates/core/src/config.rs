use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Recipient of `send_alert`.
    #[serde(default)]
    pub admin_number: Option<String>,
    /// Keywords used by `wadriver watch` when none are given explicitly.
    #[serde(default = "default_filter_keywords")]
    pub filter_keywords: Vec<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_base_url() -> String {
    "https://web.whatsapp.com".to_string()
}

fn default_filter_keywords() -> Vec<String> {
    ["Panaversity", "PIAIC", "Quiz", "Assignment", "Exam", "Deadline"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_check_interval() -> u64 {
    3600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            admin_number: None,
            filter_keywords: default_filter_keywords(),
            check_interval_secs: default_check_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// "chrome" or "edge".
    #[serde(default = "default_browser_engine")]
    pub engine: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Persistent profile directory. Defaults to `~/.wadriver/whatsapp_session`.
    #[serde(default)]
    pub profile_dir: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    /// Save a screenshot of the page once it has rendered.
    #[serde(default)]
    pub debug_screenshots: bool,
}

fn default_browser_engine() -> String {
    "chrome".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_navigation_timeout() -> u64 {
    90
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: default_browser_engine(),
            headless: default_headless(),
            profile_dir: None,
            user_agent: default_user_agent(),
            extra_args: Vec::new(),
            navigation_timeout_secs: default_navigation_timeout(),
            debug_screenshots: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_lock_poll")]
    pub poll_interval_ms: u64,
}

fn default_lock_timeout() -> u64 {
    60
}

fn default_lock_poll() -> u64 {
    1000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: default_lock_timeout(),
            poll_interval_ms: default_lock_poll(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Bounded wait for the first authenticated or challenge indicator.
    #[serde(default = "default_initial_wait")]
    pub initial_wait_secs: u64,
    #[serde(default = "default_auth_poll")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_observation_window")]
    pub observation_window_secs: u64,
    /// Pause before re-probing when neither indicator was present.
    #[serde(default = "default_round_backoff")]
    pub round_backoff_secs: u64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Extra wait after the "End-to-end encrypted" banner for chats to sync.
    #[serde(default = "default_sync_settle")]
    pub sync_settle_secs: u64,
    /// Wait after the first navigation for the client to render.
    #[serde(default = "default_render_settle")]
    pub render_settle_secs: u64,
    #[serde(default = "default_print_qr")]
    pub print_qr_to_terminal: bool,
}

fn default_initial_wait() -> u64 {
    60
}

fn default_auth_poll() -> u64 {
    5
}

fn default_observation_window() -> u64 {
    60
}

fn default_round_backoff() -> u64 {
    30
}

fn default_max_rounds() -> u32 {
    3
}

fn default_sync_settle() -> u64 {
    15
}

fn default_render_settle() -> u64 {
    10
}

fn default_print_qr() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            initial_wait_secs: default_initial_wait(),
            poll_interval_secs: default_auth_poll(),
            observation_window_secs: default_observation_window(),
            round_backoff_secs: default_round_backoff(),
            max_rounds: default_max_rounds(),
            sync_settle_secs: default_sync_settle(),
            render_settle_secs: default_render_settle(),
            print_qr_to_terminal: default_print_qr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Large histories render progressively, so this is generous.
    #[serde(default = "default_row_wait")]
    pub row_wait_secs: u64,
    #[serde(default = "default_render_buffer")]
    pub render_buffer_secs: u64,
    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: u32,
    #[serde(default = "default_scroll_px")]
    pub scroll_px: i64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_row_wait() -> u64 {
    90
}

fn default_render_buffer() -> u64 {
    5
}

fn default_scroll_steps() -> u32 {
    3
}

fn default_scroll_px() -> i64 {
    500
}

fn default_limit() -> usize {
    20
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            row_wait_secs: default_row_wait(),
            render_buffer_secs: default_render_buffer(),
            scroll_steps: default_scroll_steps(),
            scroll_px: default_scroll_px(),
            default_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConfig {
    #[serde(default = "default_composer_timeout")]
    pub composer_timeout_secs: u64,
    #[serde(default = "default_search_settle")]
    pub search_settle_ms: u64,
    #[serde(default = "default_pre_submit")]
    pub pre_submit_ms: u64,
    /// No delivery acknowledgment exists, so the send is considered done
    /// after this settle period.
    #[serde(default = "default_submit_settle")]
    pub submit_settle_ms: u64,
    /// Search results that are never real contacts.
    #[serde(default = "default_excluded_entries")]
    pub excluded_entries: Vec<String>,
}

fn default_composer_timeout() -> u64 {
    30
}

fn default_search_settle() -> u64 {
    3000
}

fn default_pre_submit() -> u64 {
    1000
}

fn default_submit_settle() -> u64 {
    3000
}

fn default_excluded_entries() -> Vec<String> {
    vec!["Meta AI".to_string(), "Ask Meta AI".to_string()]
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            composer_timeout_secs: default_composer_timeout(),
            search_settle_ms: default_search_settle(),
            pre_submit_ms: default_pre_submit(),
            submit_settle_ms: default_submit_settle(),
            excluded_entries: default_excluded_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub send: SendConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load `config.json` if present, then apply `WADRIVER_*` environment overrides.
    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WADRIVER_ENABLED") {
            match parse_bool(&v) {
                Some(b) => self.engine.enabled = b,
                None => warn!(value = %v, "Ignoring unparseable WADRIVER_ENABLED"),
            }
        }
        if let Some(v) = lookup("WADRIVER_HEADLESS") {
            match parse_bool(&v) {
                Some(b) => self.browser.headless = b,
                None => warn!(value = %v, "Ignoring unparseable WADRIVER_HEADLESS"),
            }
        }
        if let Some(v) = lookup("WADRIVER_ADMIN_NUMBER") {
            let v = v.trim();
            if !v.is_empty() {
                self.engine.admin_number = Some(v.to_string());
            }
        }
        if let Some(v) = lookup("WADRIVER_FILTER_KEYWORDS") {
            let keywords: Vec<String> = v
                .split(',')
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(|k| k.to_string())
                .collect();
            if !keywords.is_empty() {
                self.engine.filter_keywords = keywords;
            }
        }
    }

    pub fn profile_dir(&self, paths: &Paths) -> PathBuf {
        match self.browser.profile_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => expand_tilde(dir),
            _ => paths.default_profile_dir(),
        }
    }

    pub fn admin_number(&self) -> Option<&str> {
        self.engine
            .admin_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl AuthConfig {
    pub fn initial_wait(&self) -> Duration {
        Duration::from_secs(self.initial_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn observation_window(&self) -> Duration {
        Duration::from_secs(self.observation_window_secs)
    }

    pub fn round_backoff(&self) -> Duration {
        Duration::from_secs(self.round_backoff_secs)
    }

    pub fn sync_settle(&self) -> Duration {
        Duration::from_secs(self.sync_settle_secs)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_secs(self.render_settle_secs)
    }
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_timings() {
        let cfg = Config::default();
        assert!(!cfg.engine.enabled);
        assert_eq!(cfg.lock.acquire_timeout_secs, 60);
        assert_eq!(cfg.auth.max_rounds, 3);
        assert_eq!(cfg.auth.observation_window_secs, 60);
        assert_eq!(cfg.auth.poll_interval_secs, 5);
        assert_eq!(cfg.scan.default_limit, 20);
        assert_eq!(cfg.send.excluded_entries, vec!["Meta AI", "Ask Meta AI"]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let raw = r#"{
  "engine": { "enabled": true, "adminNumber": "+15550001111" },
  "browser": { "headless": false, "profileDir": "/data/profile" }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert!(cfg.engine.enabled);
        assert_eq!(cfg.admin_number(), Some("+15550001111"));
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.engine, "chrome");
        assert_eq!(cfg.scan.row_wait_secs, 90);
        let paths = Paths::with_base(PathBuf::from("/ignored"));
        assert_eq!(cfg.profile_dir(&paths), PathBuf::from("/data/profile"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WADRIVER_ENABLED", "TRUE"),
            ("WADRIVER_HEADLESS", "no"),
            ("WADRIVER_ADMIN_NUMBER", " +923001234567 "),
            ("WADRIVER_FILTER_KEYWORDS", "Exam, Quiz,,"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert!(cfg.engine.enabled);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.admin_number(), Some("+923001234567"));
        assert_eq!(cfg.engine.filter_keywords, vec!["Exam", "Quiz"]);
    }

    #[test]
    fn test_bad_override_is_ignored() {
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| (k == "WADRIVER_ENABLED").then(|| "maybe".to_string()));
        assert!(!cfg.engine.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut cfg = Config::default();
        cfg.engine.enabled = true;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert!(loaded.engine.enabled);
        assert_eq!(loaded.auth.sync_settle_secs, 15);
    }
}
