//! Error types for rae-state

use thiserror::Error;

/// Errors raised by storage backends.
///
/// Backends map their native failures onto these variants so the engine can
/// tell a missing record apart from a transient outage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Write rejected because the key is already taken
    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    /// Malformed content digest
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Backend did not answer in time
    #[error("storage operation timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Any other backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Timeout { .. } | StorageError::Backend(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
