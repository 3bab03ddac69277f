//! Domain-level error taxonomy for RAE.

use chrono::{DateTime, Utc};
use rae_state::StorageError;

/// Errors produced by input validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid temporal window: valid_to {valid_to} is not after valid_from {valid_from}")]
    InvalidTemporalWindow {
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    },

    #[error("cross-scope reference: {what} belongs to {found}, expected {expected}")]
    CrossScope {
        what: String,
        expected: String,
        found: String,
    },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// RAE domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RaeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capacity exceeded: {resource} limit of {limit} reached; retry with a smaller scope")]
    Capacity { resource: &'static str, limit: usize },

    #[error("degraded result: strategies failed: {}", .strategies.join(", "))]
    Degraded { strategies: Vec<String> },

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl RaeError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        RaeError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True when the same call may succeed with a smaller depth, budget or k.
    pub fn suggests_reduced_scope(&self) -> bool {
        matches!(self, RaeError::Capacity { .. } | RaeError::Timeout { .. })
    }

    /// Stable short name of the error kind, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RaeError::Validation(_) => "validation",
            RaeError::NotFound { .. } => "not_found",
            RaeError::Conflict(_) => "conflict",
            RaeError::Capacity { .. } => "capacity",
            RaeError::Degraded { .. } => "degraded",
            RaeError::Transaction(_) => "transaction",
            RaeError::Timeout { .. } => "timeout",
            RaeError::Unavailable(_) => "unavailable",
            RaeError::Storage(_) => "storage",
        }
    }
}

impl From<StorageError> for RaeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => RaeError::NotFound { kind, id },
            StorageError::Conflict { kind, id } => {
                RaeError::Conflict(format!("{kind} already exists: {id}"))
            }
            StorageError::Timeout { operation, millis } => RaeError::Timeout { operation, millis },
            other => RaeError::Storage(other),
        }
    }
}

/// Result type for RAE domain operations.
pub type RaeResult<T> = std::result::Result<T, RaeError>;
