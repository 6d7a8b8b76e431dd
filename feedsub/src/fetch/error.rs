//! Fetch error types

use std::time::Duration;
use thiserror::Error;

/// Errors a fetch can end with
///
/// All of these are transient from the subscription's point of view: the
/// failure is recorded and the fetch is retried after the backoff.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode items: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Fetch task ended without a result")]
    Aborted,
}

impl FetchError {
    /// Create a source error from any message
    pub fn source(message: impl Into<String>) -> Self {
        FetchError::Source(message.into())
    }

    /// Check if this error came from the fetch deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}
