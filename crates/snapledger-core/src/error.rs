//! Error types module
//!
//! All errors are unified under the `AppError` enum. Every variant maps onto
//! one class of the pipeline taxonomy (`ErrorClass`), which drives retry and
//! pause decisions in the upload and sync coordinators: `Network` and
//! `Server` are transient and retried, `Quota` is terminal until an external
//! change (new permit or day rollover), `Validation` fails closed, and
//! `Unclassified` pauses the queue for operator attention.

use std::io;

use sqlx::Error as SqlxError;

/// Pipeline error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient connectivity failure; auto-retried with backoff.
    Network,
    /// Remote 5xx-class failure; auto-retried with backoff.
    Server,
    /// Quota exhausted; blocked until a new permit or day rollover.
    Quota,
    /// Malformed payload or unverifiable permit signature; fails closed.
    Validation,
    /// Everything else; pauses processing and surfaces to the operator.
    Unclassified,
}

impl ErrorClass {
    /// Whether the upload queue may retry an attempt that failed this way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Network | ErrorClass::Server)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Server => "server",
            ErrorClass::Quota => "quota",
            ErrorClass::Validation => "validation",
            ErrorClass::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Quota exhausted: {used}/{limit} uploads used")]
    QuotaExhausted { used: i64, limit: i64 },

    #[error("Invalid permit: {0}")]
    InvalidPermit(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate capture: content hash {content_hash} already recorded")]
    DuplicateCapture { content_hash: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Map this error onto the pipeline taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Network(_) => ErrorClass::Network,
            AppError::Server { .. } => ErrorClass::Server,
            AppError::QuotaExhausted { .. } => ErrorClass::Quota,
            AppError::InvalidPermit(_) | AppError::InvalidInput(_) => ErrorClass::Validation,
            AppError::Database(_)
            | AppError::NotFound(_)
            | AppError::DuplicateCapture { .. }
            | AppError::InvalidTransition { .. }
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. } => ErrorClass::Unclassified,
        }
    }

    /// Classify a remote HTTP status the way the coordinators expect:
    /// 5xx is transient, 402/429 is quota, 4xx payload shapes are validation.
    pub fn from_http_status(status: u16, message: String) -> Self {
        match status {
            402 | 429 => AppError::QuotaExhausted { used: 0, limit: 0 },
            400 | 422 => AppError::InvalidInput(message),
            s if s >= 500 => AppError::Server { status, message },
            _ => AppError::Internal(format!("Unexpected status {}: {}", status, message)),
        }
    }
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes_are_retryable() {
        assert!(AppError::Network("timed out".into()).class().is_retryable());
        assert!(AppError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .class()
        .is_retryable());
    }

    #[test]
    fn test_quota_and_validation_are_not_retryable() {
        assert!(!AppError::QuotaExhausted { used: 10, limit: 10 }
            .class()
            .is_retryable());
        assert!(!AppError::InvalidPermit("bad signature".into())
            .class()
            .is_retryable());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(
            AppError::from_http_status(503, "oops".into()).class(),
            ErrorClass::Server
        );
        assert_eq!(
            AppError::from_http_status(429, "slow down".into()).class(),
            ErrorClass::Quota
        );
        assert_eq!(
            AppError::from_http_status(400, "bad".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            AppError::from_http_status(418, "teapot".into()).class(),
            ErrorClass::Unclassified
        );
    }
}
