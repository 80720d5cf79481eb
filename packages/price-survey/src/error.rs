//! Typed errors for the survey library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! malformed request apart from a flaky upstream.

use thiserror::Error;

/// Errors that can occur during survey operations.
#[derive(Debug, Error)]
pub enum SurveyError {
    /// Request failed validation before any network call
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    /// Fetch failed (transient after retries, or permanent)
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Response decoded but lacked the expected structure
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Storage collaborator failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Credential missing or rejected
    #[error("credential error: {0}")]
    Credential(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl SurveyError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Wrap any storage-side error.
    pub fn storage(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage(e.into())
    }
}

/// Errors raised while talking to the search API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, 429 or 5xx that survived every retry
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// 4xx (other than 429) or an error embedded in the body
    #[error("permanent failure (status {status:?}): {message}")]
    Permanent { status: Option<u16>, message: String },

    /// Request URL could not be resolved
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl FetchError {
    /// Whether retrying could change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// A failed HTTP exchange, as reported by a [`crate::traits::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request timed out
    #[error("timeout fetching: {url}")]
    Timeout { url: String },
}

/// Result type alias for survey operations.
pub type Result<T> = std::result::Result<T, SurveyError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
