use thiserror::Error;

use crate::types::ErrorKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Lock contention: {0}")]
    LockContention(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Disabled: {0}")]
    Disabled(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify the error for structured results handed to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::LockContention(_) => ErrorKind::LockContention,
            Error::ElementNotFound(_) => ErrorKind::ElementNotFound,
            Error::InvalidRecipient(_) => ErrorKind::InvalidRecipient,
            Error::Network(_) => ErrorKind::Network,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Disabled(_) => ErrorKind::Disabled,
            Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Browser(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
