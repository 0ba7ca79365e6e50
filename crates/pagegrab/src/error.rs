//! Error types for the retrieval cascade.

use std::time::Duration;

/// Errors that can occur while acquiring a page.
///
/// Almost every variant is stage-local: the retriever converts it into a
/// failure signal for that stage and moves on. Only `InvalidConfig` escapes
/// [`PageRetriever::retrieve`](crate::PageRetriever::retrieve) as an `Err`.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start process: {0}")]
    Spawn(String),

    #[error("Process exited with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    #[error("Binary not available: {0}")]
    BinaryMissing(String),

    #[error("Response too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Browser not available: {0}")]
    BrowserUnavailable(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every stage ran; carries the last stage's error.
    #[error("All retrieval methods failed: {0}")]
    Exhausted(String),
}

impl FetchError {
    pub fn pdf(message: impl Into<String>) -> Self {
        FetchError::Pdf(message.into())
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        FetchError::Browser(err.to_string())
    }

    pub fn exhausted(last: impl std::fmt::Display) -> Self {
        FetchError::Exhausted(last.to_string())
    }

    /// Whether the failure came from a deadline rather than a hard error.
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Convenience result type.
pub type FetchResult<T> = Result<T, FetchError>;
