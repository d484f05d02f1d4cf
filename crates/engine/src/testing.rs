//! In-memory page, browser and launcher fixtures.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use wadriver_browser::{BrowserHandle, BrowserLauncher, LaunchOptions, PageDriver, Probe, RowRecord};
use wadriver_core::{Error, Result};

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Default)]
struct FakeState {
    present: HashSet<String>,
    /// Selectors that show up once this much time has passed.
    delayed: Vec<(String, Duration)>,
    /// Selectors that disappear once this much time has passed.
    vanishing: Vec<(String, Duration)>,
    attributes: HashMap<(String, String), String>,
    texts: HashSet<String>,
    view: String,
    rows: HashMap<(String, String), Vec<RowRecord>>,
    on_click: HashMap<String, Vec<String>>,
    on_navigate: Vec<(String, String)>,
    url: String,
    actions: Vec<String>,
    fail_screenshots: bool,
    failing_views: HashSet<String>,
}

/// A scriptable [`PageDriver`]. Interactions are appended to an action log.
pub struct FakePage {
    started: Instant,
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(FakeState {
                view: "main".to_string(),
                url: "about:blank".to_string(),
                ..Default::default()
            }),
        }
    }

    /// A page that is already logged in with the chat list rendered.
    pub fn logged_in() -> Self {
        let page = Self::new();
        page.show("#pane-side");
        page
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn show(&self, selector: &str) {
        self.state().present.insert(selector.to_string());
    }

    pub fn show_after(&self, selector: &str, after: Duration) {
        self.state().delayed.push((selector.to_string(), after));
    }

    pub fn hide_after(&self, selector: &str, after: Duration) {
        self.state().vanishing.push((selector.to_string(), after));
    }

    pub fn set_attribute(&self, selector: &str, name: &str, value: &str) {
        self.show(selector);
        self.state()
            .attributes
            .insert((selector.to_string(), name.to_string()), value.to_string());
    }

    pub fn show_text(&self, text: &str) {
        self.state().texts.insert(text.to_string());
    }

    pub fn set_rows(&self, view: &str, selector: &str, rows: Vec<RowRecord>) {
        self.state()
            .rows
            .insert((view.to_string(), selector.to_string()), rows);
    }

    /// Clicking `selector` reveals `reveals`.
    pub fn on_click(&self, selector: &str, reveals: &str) {
        self.state()
            .on_click
            .entry(selector.to_string())
            .or_default()
            .push(reveals.to_string());
    }

    /// Navigating to a URL containing `url_part` reveals `reveals`.
    pub fn on_navigate(&self, url_part: &str, reveals: &str) {
        self.state()
            .on_navigate
            .push((url_part.to_string(), reveals.to_string()));
    }

    /// Make `read_rows` fail while `view` is showing.
    pub fn fail_reads_in(&self, view: &str) {
        self.state().failing_views.insert(view.to_string());
    }

    pub fn fail_screenshots(&self) {
        self.state().fail_screenshots = true;
    }

    pub fn actions(&self) -> Vec<String> {
        self.state().actions.clone()
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.state().actions.iter().any(|a| a == action)
    }

    fn record(&self, action: String) {
        self.state().actions.push(action);
    }

    /// A comma-separated selector list matches when the whole string or any
    /// member was shown.
    fn is_present(&self, selector: &str) -> bool {
        self.is_present_single(selector)
            || (selector.contains(',')
                && selector.split(',').any(|s| self.is_present_single(s.trim())))
    }

    fn is_present_single(&self, selector: &str) -> bool {
        let elapsed = self.started.elapsed();
        let state = self.state();
        let shown = state.present.contains(selector)
            || state
                .delayed
                .iter()
                .any(|(s, after)| s == selector && elapsed >= *after);
        let gone = state
            .vanishing
            .iter()
            .any(|(s, after)| s == selector && elapsed >= *after);
        shown && !gone
    }

    fn has_visible_text(&self, text: &str, exact: bool) -> bool {
        let elapsed = self.started.elapsed();
        let state = self.state();
        let gone = state
            .vanishing
            .iter()
            .any(|(s, after)| s == text && elapsed >= *after);
        !gone
            && state.texts.iter().any(|t| {
                if exact {
                    t == text
                } else {
                    t.to_lowercase().contains(&text.to_lowercase())
                }
            })
    }

    fn reveal_after_click(&self, selector: &str) {
        let mut state = self.state();
        if let Some(reveals) = state.on_click.get(selector).cloned() {
            state.present.extend(reveals);
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate:{}", url));
        let mut state = self.state();
        state.url = url.to_string();
        state.view = "main".to_string();
        let reveals: Vec<String> = state
            .on_navigate
            .iter()
            .filter(|(part, _)| url.contains(part.as_str()))
            .map(|(_, sel)| sel.clone())
            .collect();
        state.present.extend(reveals);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state().url.clone())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(usize::from(self.is_present(selector)))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.is_present(selector))
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .state()
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .cloned())
    }

    async fn has_text(&self, text: &str, exact: bool) -> Result<bool> {
        Ok(self.has_visible_text(text, exact))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if !self.is_present(selector) {
            return Err(Error::ElementNotFound(selector.to_string()));
        }
        self.record(format!("click:{}", selector));
        if selector == crate::selectors::BACK_BUTTON {
            self.state().view = "main".to_string();
        }
        self.reveal_after_click(selector);
        Ok(())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        self.record(format!("click_nth:{}:{}", selector, index));
        self.reveal_after_click(&format!("{}#{}", selector, index));
        Ok(())
    }

    async fn click_text(&self, text: &str, exact: bool) -> Result<()> {
        if !self.has_visible_text(text, exact) {
            return Err(Error::ElementNotFound(text.to_string()));
        }
        self.record(format!("click_text:{}", text));
        if text == crate::selectors::ARCHIVED_TEXT {
            self.state().view = "archived".to_string();
        }
        Ok(())
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        if !self.is_present(selector) {
            return Err(Error::ElementNotFound(selector.to_string()));
        }
        self.record(format!("focus:{}", selector));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(format!("type:{}", text));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(format!("key:{}", key));
        Ok(())
    }

    async fn scroll_by(&self, selector: &str, delta_y: i64) -> Result<()> {
        self.record(format!("scroll:{}:{}", selector, delta_y));
        Ok(())
    }

    async fn read_rows(
        &self,
        row_selector: &str,
        _probes: &[Probe],
        limit: usize,
    ) -> Result<Vec<RowRecord>> {
        let state = self.state();
        if state.failing_views.contains(&state.view) {
            return Err(Error::Browser(format!("row read failed in {}", state.view)));
        }
        let rows = state
            .rows
            .get(&(state.view.clone(), row_selector.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(rows.into_iter().take(limit).collect())
    }

    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>> {
        if self.state().fail_screenshots {
            return Err(Error::Browser("screenshot failed".to_string()));
        }
        self.record(format!("screenshot:{}", selector.unwrap_or("page")));
        Ok(FAKE_PNG.to_vec())
    }
}

pub struct FakeBrowser {
    page: Arc<FakePage>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out browsers that all share one [`FakePage`].
pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    pub launches: AtomicUsize,
    pub closed: Arc<AtomicBool>,
    pub fail_launch: AtomicBool,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Arc<Self> {
        Arc::new(Self {
            page: Arc::new(page),
            launches: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
            fail_launch: AtomicBool::new(false),
        })
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn BrowserHandle>> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::Browser("chrome not found".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            page: self.page.clone(),
            closed: self.closed.clone(),
        }))
    }
}

pub fn row(text: &str, values: &[Option<&str>]) -> RowRecord {
    RowRecord {
        text: text.to_string(),
        values: values.iter().map(|v| v.map(|s| s.to_string())).collect(),
    }
}
