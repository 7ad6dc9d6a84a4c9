//! Error types for the WowSQL client.
//!
//! # Design
//! Variants follow the cause of the failure rather than the endpoint that
//! produced it: transport failures, one variant per meaningful HTTP status
//! class, contract mismatches (`Parse`), and locally detected problems. All
//! errors reach the caller; nothing here is retried.

use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (DNS, connect, timeout, body read).
    #[error("network error: {0}")]
    Network(#[source] BoxError),

    /// 401: missing, invalid or expired credential.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// 403: valid credential without the required privilege.
    #[error("permission denied: {message}")]
    Permission { message: String },

    /// 404: the referenced record, file or table does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// 429.
    #[error("rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// Insufficient storage, detected locally before upload (`status` is
    /// `None`) or reported by the server.
    #[error("{message}")]
    StorageLimitExceeded {
        status: Option<u16>,
        message: String,
        required_bytes: u64,
        available_bytes: u64,
    },

    /// Any other 4xx: the request was malformed.
    #[error("validation failed (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    /// 5xx.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// A non-2xx status outside the classes above.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A 2xx body did not match the expected JSON shape.
    #[error("failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),

    /// The request payload could not be serialized to JSON.
    #[error("failed to serialize request: {0}")]
    Serialization(#[source] serde_json::Error),

    /// An argument was rejected before any request was built.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn network(source: impl Into<BoxError>) -> Self {
        ApiError::Network(source.into())
    }

    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { .. } => Some(401),
            ApiError::Permission { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::RateLimit { .. } => Some(429),
            ApiError::StorageLimitExceeded { status, .. } => *status,
            ApiError::Validation { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}
