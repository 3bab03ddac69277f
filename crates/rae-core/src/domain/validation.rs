//! Input validation for graph and scoring parameters.
//!
//! Every check returns a structured `ValidationError` so callers can report
//! the offending field without parsing messages.

use chrono::{DateTime, Utc};
use rae_state::Scope;

use super::error::ValidationError;

/// Require `value` within [0, 1]. NaN is rejected.
pub fn check_unit_interval(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(value)
}

/// Require `valid_to > valid_from` when both bounds are set.
pub fn check_temporal_window(
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    if let (Some(from), Some(to)) = (valid_from, valid_to) {
        if to <= from {
            return Err(ValidationError::InvalidTemporalWindow {
                valid_from: from,
                valid_to: to,
            });
        }
    }
    Ok(())
}

/// Require a record's tenant/project to match the scope it is written to.
pub fn check_same_scope(
    what: impl Into<String>,
    expected: &Scope,
    tenant_id: &str,
    project_id: &str,
) -> Result<(), ValidationError> {
    if expected.contains(tenant_id, project_id) {
        return Ok(());
    }
    Err(ValidationError::CrossScope {
        what: what.into(),
        expected: expected.to_string(),
        found: format!("{tenant_id}/{project_id}"),
    })
}

pub fn check_not_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

/// Scope identifiers must both be set.
pub fn check_scope(scope: &Scope) -> Result<(), ValidationError> {
    check_not_empty("tenant_id", &scope.tenant_id)?;
    check_not_empty("project_id", &scope.project_id)
}
