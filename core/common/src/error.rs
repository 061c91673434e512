//! Common error types for the nubz synchronization core.

use thiserror::Error;

/// Top-level error type for nubz operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport could not be opened or a remote call failed in transit.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote service rejected a call.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Durable store operation failed and was rolled back.
    #[error("Internal storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation violates a lifecycle invariant (not retried).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write carries a version older than the stored one.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation was interrupted by its caller.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Whether a session task may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Remote(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
