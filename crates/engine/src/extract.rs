//! Chat list extraction.
//!
//! Rows are read through [`PageDriver::read_rows`] with a fixed set of
//! probes; every field has more than one way to be found because the
//! client's markup changes without notice.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wadriver_browser::{PageDriver, Probe, RowRecord};
use wadriver_core::config::ScanConfig;
use wadriver_core::{ChatSource, ChatSummary, Result};

use crate::selectors;

const TITLE_ATTR: usize = 0;
const TITLE_TEXT: usize = 1;
const TITLE_FALLBACK: usize = 2;
const PREVIEW: usize = 3;
const UNREAD_TEXT: usize = 4;
const UNREAD_LABEL: usize = 5;

pub const ROW_PROBES: [Probe; 6] = [
    Probe::attr(selectors::TITLE_WITH_ATTR, "title"),
    Probe::text(selectors::TITLE_WITH_ATTR),
    Probe::text(selectors::TITLE_FALLBACK),
    Probe::text(selectors::PREVIEW).last(),
    Probe::text(selectors::UNREAD_BADGE),
    Probe::attr(selectors::UNREAD_BADGE, "aria-label"),
];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub keywords: Vec<String>,
    /// Per view, so an archived scan can return up to twice this many.
    pub limit: usize,
    pub include_archived: bool,
}

pub struct Extractor<'a> {
    page: &'a dyn PageDriver,
    config: &'a ScanConfig,
    base_url: &'a str,
}

impl<'a> Extractor<'a> {
    pub fn new(page: &'a dyn PageDriver, config: &'a ScanConfig, base_url: &'a str) -> Self {
        Self {
            page,
            config,
            base_url,
        }
    }

    /// Archived view first (when asked), then the main list once back on it.
    pub async fn scan(&self, options: &ScanOptions) -> Result<Vec<ChatSummary>> {
        let keywords = &options.keywords;
        let mut found = Vec::new();

        self.load_lazy_rows().await;
        if options.include_archived {
            match self.scan_archived(keywords, options.limit).await {
                Ok(archived) => {
                    info!(count = archived.len(), "Scanned archived chats");
                    found.extend(archived);
                }
                Err(e) => warn!(error = %e, "Archived scan failed"),
            }
        }

        let main = self
            .read_view(ChatSource::Main, keywords, options.limit)
            .await?;
        info!(count = main.len(), "Scanned main chat list");
        found.extend(main);
        Ok(found)
    }

    /// The list materializes rows as it scrolls.
    async fn load_lazy_rows(&self) {
        match self.page.count(selectors::CHAT_PANE).await {
            Ok(n) if n > 0 => {}
            _ => return,
        }
        for _ in 0..self.config.scroll_steps {
            if let Err(e) = self
                .page
                .scroll_by(selectors::CHAT_PANE, self.config.scroll_px)
                .await
            {
                warn!(error = %e, "Chat list scroll failed");
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn scan_archived(&self, keywords: &[String], limit: usize) -> Result<Vec<ChatSummary>> {
        if !self.page.has_text(selectors::ARCHIVED_TEXT, true).await? {
            warn!("No 'Archived' entry visible; skipping archived chats");
            return Ok(Vec::new());
        }
        self.page.click_text(selectors::ARCHIVED_TEXT, true).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let chats = self.read_view(ChatSource::Archived, keywords, limit).await;
        self.leave_archived().await;
        chats
    }

    async fn leave_archived(&self) {
        let back = self.page.count(selectors::BACK_BUTTON).await.unwrap_or(0);
        let result = if back > 0 {
            self.page.click(selectors::BACK_BUTTON).await
        } else {
            debug!("No back control; reloading the chat list");
            let reload = self.page.navigate(self.base_url).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            reload
        };
        if let Err(e) = result {
            warn!(error = %e, "Leaving archived view failed");
        }
    }

    async fn read_view(
        &self,
        source: ChatSource,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<ChatSummary>> {
        self.wait_for_rows(source).await;
        tokio::time::sleep(Duration::from_secs(self.config.render_buffer_secs)).await;

        let rows = self
            .page
            .read_rows(selectors::CHAT_ROW, &ROW_PROBES, limit)
            .await?;
        debug!(source = source.as_str(), rows = rows.len(), "Read chat rows");
        Ok(rows
            .iter()
            .filter_map(|row| summarize_row(row, source, keywords))
            .collect())
    }

    async fn wait_for_rows(&self, source: ChatSource) {
        let deadline = Instant::now() + Duration::from_secs(self.config.row_wait_secs);
        loop {
            match self.page.count(selectors::CHAT_ROW).await {
                Ok(n) if n > 0 => return,
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Row count failed"),
            }
            if Instant::now() >= deadline {
                warn!(
                    source = source.as_str(),
                    timeout_secs = self.config.row_wait_secs,
                    "No chat rows appeared; list may be empty or the layout changed"
                );
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Build a summary from one row, or `None` when it has no title or fails
/// the keyword filter. Keywords are used as given: an empty keyword matches
/// every row.
pub fn summarize_row(row: &RowRecord, source: ChatSource, keywords: &[String]) -> Option<ChatSummary> {
    let title = row
        .value(TITLE_ATTR)
        .or_else(|| row.value(TITLE_TEXT))
        .or_else(|| row.value(TITLE_FALLBACK))?
        .to_string();
    let preview = row.value(PREVIEW).unwrap_or_default().to_string();
    let unread_count = parse_unread(row.value(UNREAD_TEXT))
        .or_else(|| parse_unread(row.value(UNREAD_LABEL)))
        .unwrap_or(0);

    let matched_keyword = if keywords.is_empty() {
        None
    } else {
        let title_lc = title.to_lowercase();
        let preview_lc = preview.to_lowercase();
        let hit = keywords.iter().find(|k| {
            let k = k.to_lowercase();
            title_lc.contains(&k) || preview_lc.contains(&k)
        })?;
        Some(hit.clone())
    };

    Some(ChatSummary {
        title,
        last_message_preview: preview,
        unread_count,
        source,
        matched_keyword,
    })
}

/// Leading number of a badge text or label such as "3 unread messages".
fn parse_unread(raw: Option<&str>) -> Option<u32> {
    let digits: String = raw?
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, FakePage};

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn chat(title: &str, preview: &str, unread: Option<&str>) -> RowRecord {
        row(
            &format!("{} {}", title, preview),
            &[Some(title), Some(title), None, Some(preview), unread, None],
        )
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            row_wait_secs: 5,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_title_strategies_in_order() {
        let r = row("", &[None, Some("Text Title"), Some("Fallback"), None, None, None]);
        let s = summarize_row(&r, ChatSource::Main, &[]).unwrap();
        assert_eq!(s.title, "Text Title");

        let r = row("", &[None, None, Some("Fallback"), Some("hi"), None, None]);
        let s = summarize_row(&r, ChatSource::Main, &[]).unwrap();
        assert_eq!(s.title, "Fallback");
        assert_eq!(s.last_message_preview, "hi");
    }

    #[test]
    fn test_row_without_title_is_skipped() {
        let r = row("orphan", &[None, None, None, Some("preview"), None, None]);
        assert!(summarize_row(&r, ChatSource::Main, &[]).is_none());
    }

    #[test]
    fn test_unread_from_text_or_label() {
        let r = chat("Ada", "hi", Some("4"));
        assert_eq!(summarize_row(&r, ChatSource::Main, &[]).unwrap().unread_count, 4);

        let r = row("", &[Some("Ada"), None, None, None, None, Some("12 unread messages")]);
        assert_eq!(summarize_row(&r, ChatSource::Main, &[]).unwrap().unread_count, 12);

        let r = chat("Ada", "hi", None);
        assert_eq!(summarize_row(&r, ChatSource::Main, &[]).unwrap().unread_count, 0);
    }

    #[test]
    fn test_keyword_filter_records_first_match() {
        let keywords = kw(&["Quiz", "Exam"]);
        let r = chat("PIAIC Batch 5", "exam and quiz tomorrow", None);
        let s = summarize_row(&r, ChatSource::Main, &keywords).unwrap();
        assert_eq!(s.matched_keyword.as_deref(), Some("Quiz"));

        let r = chat("Family", "dinner at 8", None);
        assert!(summarize_row(&r, ChatSource::Main, &keywords).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_reads_archived_before_main() {
        let page = FakePage::logged_in();
        page.show(selectors::CHAT_ROW);
        page.show_text("Archived");
        page.show(selectors::BACK_BUTTON);
        page.set_rows("main", selectors::CHAT_ROW, vec![chat("Ada", "hello", Some("1"))]);
        page.set_rows(
            "archived",
            selectors::CHAT_ROW,
            vec![chat("Ada", "hello", Some("1")), chat("Old Group", "bye", None)],
        );
        let config = fast_config();
        let extractor = Extractor::new(&page, &config, "https://web.whatsapp.com");

        let chats = extractor
            .scan(&ScanOptions {
                keywords: vec![],
                limit: 20,
                include_archived: true,
            })
            .await
            .unwrap();

        let tagged: Vec<(&str, ChatSource)> =
            chats.iter().map(|c| (c.title.as_str(), c.source)).collect();
        assert_eq!(
            tagged,
            vec![
                ("Ada", ChatSource::Archived),
                ("Old Group", ChatSource::Archived),
                ("Ada", ChatSource::Main),
            ]
        );
        let actions = page.actions();
        let back = actions
            .iter()
            .position(|a| a == &format!("click:{}", selectors::BACK_BUTTON))
            .unwrap();
        let archived = actions
            .iter()
            .position(|a| a == "click_text:Archived")
            .unwrap();
        assert!(archived < back);
        assert_eq!(
            page.actions()
                .iter()
                .filter(|a| a.starts_with("scroll:"))
                .count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_archived_entry_is_not_fatal() {
        let page = FakePage::logged_in();
        page.show(selectors::CHAT_ROW);
        page.set_rows("main", selectors::CHAT_ROW, vec![chat("Ada", "hello", None)]);
        let config = fast_config();
        let extractor = Extractor::new(&page, &config, "https://web.whatsapp.com");

        let chats = extractor
            .scan(&ScanOptions {
                keywords: vec![],
                limit: 20,
                include_archived: true,
            })
            .await
            .unwrap();
        assert_eq!(chats.len(), 1);
        assert!(!page.actions().iter().any(|a| a.starts_with("click_text:")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_falls_back_to_reload() {
        let page = FakePage::logged_in();
        page.show(selectors::CHAT_ROW);
        page.show_text("Archived");
        let config = fast_config();
        let extractor = Extractor::new(&page, &config, "https://web.whatsapp.com");

        extractor
            .scan(&ScanOptions {
                keywords: vec![],
                limit: 20,
                include_archived: true,
            })
            .await
            .unwrap();
        assert!(page.has_action("navigate:https://web.whatsapp.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_and_keywords_apply_per_view() {
        let page = FakePage::logged_in();
        page.show(selectors::CHAT_ROW);
        page.set_rows(
            "main",
            selectors::CHAT_ROW,
            vec![
                chat("Quiz group", "", None),
                chat("Family", "", None),
                chat("Exam prep", "", None),
            ],
        );
        let config = fast_config();
        let extractor = Extractor::new(&page, &config, "https://web.whatsapp.com");

        let chats = extractor
            .scan(&ScanOptions {
                keywords: kw(&["exam", "quiz"]),
                limit: 2,
                include_archived: false,
            })
            .await
            .unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "Quiz group");
        assert_eq!(chats[0].matched_keyword.as_deref(), Some("quiz"));
    }

    #[test]
    fn test_blank_keyword_matches_everything() {
        let keywords = kw(&["", "Quiz"]);
        let r = chat("Family", "dinner at 8", None);
        let s = summarize_row(&r, ChatSource::Main, &keywords).unwrap();
        assert_eq!(s.matched_keyword.as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_archived_read_still_returns_to_main() {
        let page = FakePage::logged_in();
        page.show(selectors::CHAT_ROW);
        page.show_text("Archived");
        page.show(selectors::BACK_BUTTON);
        page.set_rows("main", selectors::CHAT_ROW, vec![chat("Ada", "hello", None)]);
        page.fail_reads_in("archived");
        let config = fast_config();
        let extractor = Extractor::new(&page, &config, "https://web.whatsapp.com");

        let chats = extractor
            .scan(&ScanOptions {
                keywords: vec![],
                limit: 20,
                include_archived: true,
            })
            .await
            .unwrap();
        assert!(page.has_action(&format!("click:{}", selectors::BACK_BUTTON)));
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].source, ChatSource::Main);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_waits_bounded() {
        let page = FakePage::logged_in();
        let config = fast_config();
        let extractor = Extractor::new(&page, &config, "https://web.whatsapp.com");

        let start = Instant::now();
        let chats = extractor
            .scan(&ScanOptions {
                keywords: vec![],
                limit: 20,
                include_archived: false,
            })
            .await
            .unwrap();
        assert!(chats.is_empty());
        // 3 scroll steps, 5s row wait, 5s render buffer.
        assert!(start.elapsed() <= Duration::from_secs(14));
    }
}
