//! Error types for backend transport operations

use std::fmt;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while talking to a backend
#[derive(Debug)]
pub enum BackendError {
    /// Network or protocol failure reported by the HTTP client
    Request(reqwest::Error),

    /// The request did not complete within the configured timeout
    Timeout,

    /// The backend rejected the payload itself; re-sending will not help
    BadRequest(String),

    /// Any other non-success status
    Status { code: u16, body: String },

    /// Compression or response sink failure
    Io(std::io::Error),

    /// Queries are not served by write-only backends
    WriteOnly,

    /// Batches still queued after a delivery attempt that had to reach the
    /// backend (on-demand flush, close)
    Undelivered { batches: usize, bytes: usize },

    /// The configuration cannot drive a backend
    InvalidConfig(String),

    /// The transport has been closed
    Closed,

    /// The background task ended without being closed
    Stopped,
}

impl BackendError {
    /// Whether the failure says something about backend liveness (as opposed
    /// to the payload or the caller)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BackendError::Request(_) | BackendError::Timeout | BackendError::Status { .. }
        )
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Request(err) => write!(f, "backend request failed: {}", err),
            BackendError::Timeout => write!(f, "backend request timed out"),
            BackendError::BadRequest(body) => write!(f, "backend rejected payload: {}", body),
            BackendError::Status { code, body } => {
                write!(f, "backend returned status {}: {}", code, body)
            }
            BackendError::Io(err) => write!(f, "I/O error: {}", err),
            BackendError::WriteOnly => write!(f, "backend is write-only"),
            BackendError::Undelivered { batches, bytes } => {
                write!(f, "{} batches ({} bytes) not delivered", batches, bytes)
            }
            BackendError::InvalidConfig(reason) => write!(f, "invalid backend config: {}", reason),
            BackendError::Closed => write!(f, "backend is closed"),
            BackendError::Stopped => write!(f, "backend task stopped unexpectedly"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Request(err) => Some(err),
            BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Request(err)
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err)
    }
}
