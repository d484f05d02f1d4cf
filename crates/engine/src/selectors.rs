//! Selectors and on-screen strings for WhatsApp Web.
//!
//! The client ships no stable DOM contract, so most lookups are prioritized
//! lists tried in order.

/// Present only once the chat list UI is up.
pub const LOGIN_INDICATORS: &[&str] = &[
    "#pane-side",
    r#"[data-testid="chat-list"]"#,
    r#"div[aria-label="Chat list"]"#,
    r#"[data-testid="chat-list-search"]"#,
    r#"[data-icon="chat"]"#,
    r#"[data-testid="intro-text"]"#,
    r#"div[data-testid="conversation-panel-messages"]"#,
    r#"span[data-testid="menu"]"#,
    r#"[data-testid="menu-bar-menu"]"#,
    r#"div[role="application"]"#,
    r#"[aria-label="Search input textbox"]"#,
    r#"header[data-testid="chatlist-header"]"#,
];

/// Pairing code elements; the payload lives in `data-ref`.
pub const QR_SELECTORS: &[&str] = &[
    r#"canvas[aria-label="Scan this QR code"]"#,
    r#"canvas[aria-label*="QR"]"#,
    "div[data-ref]",
    "[data-ref]",
    r#"canvas[role="img"]"#,
];

pub const QR_PAYLOAD_ATTR: &str = "data-ref";

/// Anything that means the first render finished, logged in or not.
pub const FIRST_RENDER: &str = "#pane-side, canvas, div[data-ref], [data-ref]";

pub const LOADING_SPLASH_TEXT: &str = "Loading your chats";
pub const ENCRYPTED_BANNER_TEXT: &str = "End-to-end encrypted";

pub const CHAT_PANE: &str = "#pane-side";
pub const CHAT_ROW: &str = r#"div[role="row"]"#;
pub const ARCHIVED_TEXT: &str = "Archived";
pub const BACK_BUTTON: &str = r#"[data-icon="back"], button[aria-label="Back"]"#;

pub const TITLE_WITH_ATTR: &str = r#"[dir="auto"][title]"#;
pub const TITLE_FALLBACK: &str = "div._ak8q span";
pub const PREVIEW: &str = r#"span[dir="auto"]"#;
pub const UNREAD_BADGE: &str = r#"[aria-label*="unread message"]"#;

pub const SEARCH_BOXES: &[&str] = &[
    r#"div[contenteditable="true"][data-tab="3"]"#,
    r#"div[aria-label="Search"]"#,
    r#"div[title="Search input textbox"]"#,
    r#"button[aria-label="Search or start new chat"]"#,
];
pub const SEARCH_PLACEHOLDER: &str =
    r#"input[placeholder*="Search" i], [data-placeholder*="Search" i], [aria-placeholder*="Search" i]"#;
pub const SEARCH_RESULT_ROW: &str = r#"#pane-side div[role="row"]"#;

pub const COMPOSER: &str = r#"footer div[contenteditable="true"]"#;
pub const INVALID_NUMBER_POPUP: &str = r#"div[data-testid="popup-controls-ok"]"#;

/// `span[title="..."]` matching a chat title exactly.
pub fn exact_title(title: &str) -> String {
    format!(r#"span[title="{}"]"#, css_string(title))
}

/// Escape a value for use inside a double-quoted CSS attribute selector.
pub fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out
}
