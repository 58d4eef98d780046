//! Error types for segmented transfers.

use std::io;
use thiserror::Error;

/// Errors that can occur while planning, downloading or merging a transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error during download.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// No URL was given, or it was blank.
    #[error("No download link given (http, https and thunder links are supported)")]
    EmptyUrl,

    /// The URL scheme is not in the allow-list.
    #[error("Unsupported protocol: {0}")]
    UnsupportedScheme(String),

    /// A `thunder://` link could not be decoded.
    #[error("Invalid thunder link: {0}")]
    InvalidLink(String),

    /// The (decoded) URL could not be parsed.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No usable local file name could be derived from the URL.
    #[error("Cannot derive a file name from {0}")]
    InvalidFileName(String),

    /// Segment count must be at least one.
    #[error("Segment count must be at least 1, got {0}")]
    InvalidSegmentCount(usize),

    /// The remote object is empty, there is nothing to partition.
    #[error("Remote object is empty, nothing to download")]
    EmptyObject,

    /// The server did not report a usable content length.
    #[error("Server did not report a usable content length for {0}")]
    MissingContentLength(String),

    /// The server answered 404.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The server answered a mid-object range request with the full body.
    #[error("Server ignored range request bytes={0}-")]
    RangeIgnored(u64),

    /// A `206` answer started somewhere other than the requested offset.
    #[error("Server answered {got} to a range request starting at byte {expected}")]
    UnexpectedRange { expected: u64, got: String },

    /// The body ended before the segment was filled.
    #[error("Segment body ended early: expected {expected} bytes, got {got}")]
    ShortSegment { expected: u64, got: u64 },

    /// A single attempt exceeded its deadline.
    #[error("Attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A spawned task failed to join.
    #[error("Task failed: {0}")]
    Task(String),
}

impl TransferError {
    /// Configuration errors are reported before any network I/O.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TransferError::EmptyUrl
                | TransferError::UnsupportedScheme(_)
                | TransferError::InvalidLink(_)
                | TransferError::InvalidUrl { .. }
                | TransferError::InvalidFileName(_)
                | TransferError::InvalidSegmentCount(_)
                | TransferError::EmptyObject
        )
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::NotFound(_)
            | TransferError::RangeIgnored(_)
            | TransferError::UnexpectedRange { .. } => false,
            TransferError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            TransferError::SerdeJsonError(_) | TransferError::Task(_) => false,
            other => !other.is_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_permanent() {
        let err = TransferError::NotFound("http://example.com/a".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_config());
    }

    #[test]
    fn test_status_classification() {
        let server = TransferError::HttpStatus {
            status: 503,
            url: "u".to_string(),
        };
        let client = TransferError::HttpStatus {
            status: 416,
            url: "u".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_config_errors_not_retried() {
        assert!(TransferError::EmptyUrl.is_config());
        assert!(!TransferError::EmptyUrl.is_retryable());
        assert!(TransferError::UnsupportedScheme("ftp://x".into()).is_config());
        assert!(TransferError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_short_body_is_retried_but_wrong_range_is_not() {
        let short = TransferError::ShortSegment {
            expected: 200,
            got: 50,
        };
        let shifted = TransferError::UnexpectedRange {
            expected: 400,
            got: "bytes 0-199/1000".to_string(),
        };
        assert!(short.is_retryable());
        assert!(!short.is_config());
        assert!(!shifted.is_retryable());
    }
}
