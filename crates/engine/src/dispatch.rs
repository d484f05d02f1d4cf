//! Opening a conversation and submitting a message.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wadriver_browser::PageDriver;
use wadriver_core::config::SendConfig;
use wadriver_core::types::normalize_number;
use wadriver_core::{Error, Result, SendRequest, SendStatus, TargetKind};

use crate::selectors;

/// Cap on search results inspected when resolving a name.
const MAX_SEARCH_ROWS: usize = 50;

/// `<base>/send?phone=<digits>&text=<percent-encoded>`
pub fn deep_link(base_url: &str, target: &str, message: &str) -> String {
    format!(
        "{}/send?phone={}&text={}",
        base_url.trim_end_matches('/'),
        normalize_number(target),
        urlencoding::encode(message)
    )
}

pub struct Dispatcher<'a> {
    page: &'a dyn PageDriver,
    config: &'a SendConfig,
    base_url: &'a str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(page: &'a dyn PageDriver, config: &'a SendConfig, base_url: &'a str) -> Self {
        Self {
            page,
            config,
            base_url,
        }
    }

    pub async fn send(&self, request: &SendRequest) -> Result<SendStatus> {
        if request.target.is_empty() {
            return Err(Error::InvalidRecipient("Empty send target".to_string()));
        }

        match request.target_kind {
            TargetKind::Numeric => {
                let url = deep_link(self.base_url, &request.target, &request.message);
                info!(recipient = %normalize_number(&request.target), "Opening chat by number");
                self.page.navigate(&url).await?;
            }
            TargetKind::Name => {
                info!(recipient = %request.target, "Searching for chat by name");
                self.open_by_name(&request.target).await?;
            }
        }

        self.wait_for_composer(request).await?;
        self.page.focus(selectors::COMPOSER).await?;

        // The deep link pre-fills the composer.
        if request.target_kind == TargetKind::Name {
            for line in request.message.split('\n') {
                self.page.type_text(line).await?;
                self.page.press_key("Shift+Enter").await?;
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.pre_submit_ms)).await;
        self.page.press_key("Enter").await?;
        tokio::time::sleep(Duration::from_millis(self.config.submit_settle_ms)).await;
        info!(recipient = %request.target, "Message submitted");
        Ok(SendStatus::Sent)
    }

    async fn open_by_name(&self, target: &str) -> Result<()> {
        let search_box = self.find_search_box().await?;
        self.page.click(search_box).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.page.type_text(target).await?;
        tokio::time::sleep(Duration::from_millis(self.config.search_settle_ms)).await;

        let rows = self
            .page
            .read_rows(selectors::SEARCH_RESULT_ROW, &[], MAX_SEARCH_ROWS)
            .await?;
        let pick = rows.iter().position(|row| !self.is_excluded(&row.text));
        if let Some(index) = pick {
            debug!(index, text = %preview(&rows[index].text), "Opening search result");
            return self
                .page
                .click_nth(selectors::SEARCH_RESULT_ROW, index)
                .await;
        }

        warn!(recipient = target, results = rows.len(), "No usable search result; trying exact title");
        let strict = selectors::exact_title(target);
        if self.page.count(&strict).await? > 0 {
            return self.page.click(&strict).await;
        }
        Err(Error::InvalidRecipient(format!(
            "Contact '{}' not found",
            target
        )))
    }

    async fn find_search_box(&self) -> Result<&'static str> {
        for selector in selectors::SEARCH_BOXES {
            if self.page.count(selector).await? > 0 {
                return Ok(*selector);
            }
        }
        if self.page.count(selectors::SEARCH_PLACEHOLDER).await? > 0 {
            return Ok(selectors::SEARCH_PLACEHOLDER);
        }
        Err(Error::ElementNotFound("Could not find search box".to_string()))
    }

    fn is_excluded(&self, text: &str) -> bool {
        self.config
            .excluded_entries
            .iter()
            .any(|entry| text.contains(entry.as_str()))
    }

    async fn wait_for_composer(&self, request: &SendRequest) -> Result<()> {
        let timeout = Duration::from_secs(self.config.composer_timeout_secs);
        let deadline = Instant::now() + timeout;
        loop {
            if request.target_kind == TargetKind::Numeric
                && self.page.is_visible(selectors::INVALID_NUMBER_POPUP).await?
            {
                return Err(Error::InvalidRecipient(format!(
                    "'{}' is not a valid WhatsApp number",
                    request.target
                )));
            }
            if self.page.is_visible(selectors::COMPOSER).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::ElementNotFound(format!(
                    "Chat input did not appear within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(30).collect()
}
