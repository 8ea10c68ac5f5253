//! Error types for obdl-feed

use std::time::Duration;
use thiserror::Error;

/// Result type for feed client operations
pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Feed client error type
#[derive(Debug, Error)]
pub enum FeedError {
    /// Connection, TLS or protocol failure below HTTP status level
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    /// Response body is not the expected JSON shape
    #[error("Invalid feed payload: {0}")]
    Decode(String),

    /// Request did not complete within its bound
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// obdl-common error
    #[error("Common error: {0}")]
    Common(#[from] obdl_common::Error),
}

impl FeedError {
    /// Whether retrying the same request may succeed
    ///
    /// Transport failures, timeouts, 429 and 5xx are transient. Anything the
    /// backend rejected deliberately (other 4xx) or a malformed payload is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Transport(e) => !e.is_builder() && !e.is_decode(),
            FeedError::Timeout(_) => true,
            FeedError::Status { status, .. } => *status == 429 || *status >= 500,
            FeedError::Decode(_) | FeedError::Common(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FeedError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(FeedError::Status { status: 503, url: "u".into() }.is_retryable());
        assert!(FeedError::Status { status: 429, url: "u".into() }.is_retryable());
        assert!(!FeedError::Status { status: 404, url: "u".into() }.is_retryable());
        assert!(!FeedError::Decode("bad".into()).is_retryable());
    }
}
