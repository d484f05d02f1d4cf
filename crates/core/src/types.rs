use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which chat list a summary was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSource {
    Main,
    Archived,
}

impl ChatSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Archived => "archived",
        }
    }
}

/// One conversation row as it appeared in the chat list during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub title: String,
    pub last_message_preview: String,
    pub unread_count: u32,
    pub source: ChatSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_keyword: Option<String>,
}

/// How a send target is resolved to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A phone number; opened through a deep link.
    Numeric,
    /// A contact or group name; opened through search.
    Name,
}

impl TargetKind {
    /// A target is numeric iff, once `+`, spaces and `-` are stripped, what
    /// remains is a non-empty run of ASCII digits.
    pub fn classify(target: &str) -> Self {
        let digits = normalize_number(target);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            Self::Numeric
        } else {
            Self::Name
        }
    }
}

/// Strip the separators people put in phone numbers.
pub fn normalize_number(target: &str) -> String {
    target
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub target: String,
    pub target_kind: TargetKind,
    pub message: String,
}

impl SendRequest {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        let target = target.into().trim().to_string();
        let target_kind = TargetKind::classify(&target);
        Self {
            target,
            target_kind,
            message: message.into(),
        }
    }
}

/// Error classification carried by every failed [`OperationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    LockContention,
    ElementNotFound,
    InvalidRecipient,
    Network,
    Timeout,
    Disabled,
    Internal,
}

/// Result envelope returned by every public engine operation.
///
/// Failures never escape as `Err`: they are folded into `error_kind` and a
/// human-readable `error` so callers can decide whether to retry, alert or
/// skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> OperationResult<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            error_kind: None,
            error: None,
            payload,
        }
    }

    pub fn failed(err: &Error, payload: T) -> Self {
        Self {
            success: false,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
            payload,
        }
    }

    pub fn from_result(result: crate::Result<T>) -> Self
    where
        T: Default,
    {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => Self::failed(&e, T::default()),
        }
    }
}

/// Payload of `check_messages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanPayload {
    pub messages: Vec<ChatSummary>,
    pub count: usize,
}

impl ScanPayload {
    pub fn new(messages: Vec<ChatSummary>) -> Self {
        let count = messages.len();
        Self { messages, count }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
}

/// Payload of `send_message`. `status` is absent on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SendStatus>,
}

/// Payload of `authenticate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub authenticated: bool,
    /// How many pairing challenges were presented before success.
    pub challenges_presented: u32,
}

/// Best-effort engine status; never touches the browser or the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_number: Option<String>,
    pub session_dir: String,
    pub locked: bool,
}
