//! Custom error types for rustpaperdigest.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, DigestError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for rustpaperdigest operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rate limited by a remote host, retries exhausted
    #[error("Rate limited, gave up after {0} attempts")]
    RateLimited(u32),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status or error code from API
        code: i32,
        /// Error message from API
        message: String,
    },

    /// A requested resource (full-text link, table, stored artifact) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// PDF is malformed or unreadable
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// PDF parsed cleanly but yielded no usable text
    #[error("Empty content: {0}")]
    EmptyContent(String),

    /// Summarization service failure (authentication, quota, malformed reply)
    #[error("Remote API error: {0}")]
    RemoteApi(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// HTML/URL parsing error
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias using `DigestError`
pub type Result<T> = std::result::Result<T, DigestError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| DigestError::Parse(msg.to_string()))
    }
}
