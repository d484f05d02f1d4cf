//! Capability traits the automation engine programs against.
//!
//! The engine never talks CDP directly: it sees a [`PageDriver`] (one page
//! of a running browser), a [`BrowserHandle`] (the browser that owns it) and
//! a [`BrowserLauncher`] (how to start one against a persistent profile).
//! Production uses the CDP implementations in this crate; tests use fixtures.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use wadriver_core::Result;

/// Where a probe reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeRead {
    /// Trimmed `textContent`.
    Text,
    /// A named attribute.
    Attr(&'static str),
}

/// Which match to use when a probe selector matches several elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePick {
    First,
    Last,
}

/// One field lookup evaluated relative to each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub selector: &'static str,
    pub read: ProbeRead,
    pub pick: ProbePick,
}

impl Probe {
    pub const fn text(selector: &'static str) -> Self {
        Self {
            selector,
            read: ProbeRead::Text,
            pick: ProbePick::First,
        }
    }

    pub const fn attr(selector: &'static str, name: &'static str) -> Self {
        Self {
            selector,
            read: ProbeRead::Attr(name),
            pick: ProbePick::First,
        }
    }

    pub const fn last(self) -> Self {
        Self {
            pick: ProbePick::Last,
            ..self
        }
    }
}

/// A row as read by [`PageDriver::read_rows`]: the row's full text plus one
/// value per requested probe, in probe order. Empty values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRecord {
    pub text: String,
    pub values: Vec<Option<String>>,
}

impl RowRecord {
    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }
}

/// One page of a running browser.
///
/// Every method is a single bounded round-trip; waiting and retrying is the
/// caller's job.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait (bounded) for the document to finish loading.
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Whether the first match of `selector` is rendered with a non-empty box.
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Attribute of the first match, `None` when absent or no match.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Whether a visible leaf element shows `text` (exactly, or as a
    /// case-insensitive substring).
    async fn has_text(&self, text: &str, exact: bool) -> Result<bool>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()>;

    /// Click the first visible leaf element showing `text`.
    async fn click_text(&self, text: &str, exact: bool) -> Result<()>;

    async fn focus(&self, selector: &str) -> Result<()>;

    /// Insert text at the current focus.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Press a key spec such as `"Enter"` or `"Shift+Enter"`.
    async fn press_key(&self, key: &str) -> Result<()>;

    async fn scroll_by(&self, selector: &str, delta_y: i64) -> Result<()>;

    /// The structured-row reader: up to `limit` rows matching
    /// `row_selector`, each with its probes evaluated relative to the row.
    async fn read_rows(
        &self,
        row_selector: &str,
        probes: &[Probe],
        limit: usize,
    ) -> Result<Vec<RowRecord>>;

    /// PNG bytes of the element matching `selector`, or of the viewport.
    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>>;
}

/// A running browser bound to one persistent profile.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn page(&self) -> &dyn PageDriver;

    /// Shut the browser down. Must be safe to call on an already-dead browser.
    async fn close(&mut self);
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub engine: crate::launcher::BrowserEngine,
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub extra_args: Vec<String>,
    pub navigation_timeout: Duration,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserHandle>>;
}
