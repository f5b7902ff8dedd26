/*!
 * Error types for the lingoflow library.
 *
 * This module contains custom error types for the different parts of the
 * translation pipeline, using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Coarse classification of a per-text translation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationErrorKind {
    NetworkFailure,
    VendorRejected,
    QuotaExceeded,
    MalformedResponse,
}

/// Errors surfaced by a single `translate` call.
///
/// The variants are closed so callers can branch on the kind; the original
/// message travels along as context. The error is `Clone` because one failure
/// is fanned out to every key sharing the failed text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// The request never reached the service or the connection broke
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The service answered but refused the request
    #[error("Vendor rejected request: {0}")]
    VendorRejected(String),

    /// The service reported a quota or rate limit condition
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The service answered with something that could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl TranslationError {
    /// Get the kind of this error
    pub fn kind(&self) -> TranslationErrorKind {
        match self {
            Self::NetworkFailure(_) => TranslationErrorKind::NetworkFailure,
            Self::VendorRejected(_) => TranslationErrorKind::VendorRejected,
            Self::QuotaExceeded(_) => TranslationErrorKind::QuotaExceeded,
            Self::MalformedResponse(_) => TranslationErrorKind::MalformedResponse,
        }
    }

    /// Get the original message carried by this error
    pub fn message(&self) -> &str {
        match self {
            Self::NetworkFailure(message)
            | Self::VendorRejected(message)
            | Self::QuotaExceeded(message)
            | Self::MalformedResponse(message) => message,
        }
    }
}

/// Errors that can occur when talking to the durable key-value store
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store refused the write because it is full
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other failure of the backing store
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// The stored blob could not be (de)serialized
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::DiskFull =>
            {
                Self::QuotaExceeded(error.to_string())
            }
            _ => Self::Backend(error.to_string()),
        }
    }
}

/// Errors reported by the bounded work pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The unit's task ended without producing a result (for example it panicked)
    #[error("Work unit was cancelled before it settled")]
    Cancelled,
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the translation service
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from the durable store
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error from the work pool
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
