//! Structured observability hooks for RAE query and graph lifecycle events.
//!
//! This module provides:
//! - Query-scoped tracing spans via `query_span`
//! - Emission functions for search completion, degraded strategies, dedup
//!   hits, snapshot create/restore, rollback and decay ticks
//!
//! Events are emitted at `info!` level unless noted (filter via `RAE_LOG`).

use tracing::{info, warn};
use uuid::Uuid;

use rae_state::Scope;

use crate::scoring::DecayReport;

/// Query-scoped span for one search.
///
/// Attach it with `tracing::Instrument` so the search future stays `Send`:
///
/// ```ignore
/// async { /* search */ }.instrument(query_span(&scope, "capital of France")).await
/// // tracing calls inside carry tenant, project and query
/// ```
pub fn query_span(scope: &Scope, query: &str) -> tracing::Span {
    tracing::info_span!(
        "rae.query",
        tenant = %scope.tenant_id,
        project = %scope.project_id,
        query = %query,
    )
}

pub fn emit_search_completed(
    scope: &Scope,
    profile: &str,
    results: usize,
    degraded: usize,
    duration_ms: u64,
) {
    info!(
        event = "search.completed",
        scope = %scope,
        profile = %profile,
        results = results,
        degraded = degraded,
        duration_ms = duration_ms,
    );
}

/// One strategy failed or timed out (warning level).
pub fn emit_strategy_degraded(strategy: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "search.strategy_degraded", strategy = %strategy, reason = %reason);
}

pub fn emit_dedup_hit(scope: &Scope, existing_id: Uuid, similarity: f64) {
    info!(
        event = "memory.dedup_hit",
        scope = %scope,
        existing_id = %existing_id,
        similarity = similarity,
    );
}

pub fn emit_snapshot_created(scope: &Scope, snapshot_id: Uuid, nodes: usize, edges: usize) {
    info!(
        event = "snapshot.created",
        scope = %scope,
        snapshot_id = %snapshot_id,
        nodes = nodes,
        edges = edges,
    );
}

pub fn emit_snapshot_restored(scope: &Scope, snapshot_id: Uuid, mode: &str) {
    info!(
        event = "snapshot.restored",
        scope = %scope,
        snapshot_id = %snapshot_id,
        mode = %mode,
    );
}

/// A replace restore was rolled back (warning level).
pub fn emit_restore_rolled_back(scope: &Scope, snapshot_id: Uuid, error: &dyn std::fmt::Display) {
    warn!(
        event = "snapshot.rolled_back",
        scope = %scope,
        snapshot_id = %snapshot_id,
        error = %error,
    );
}

pub fn emit_decay_completed(report: &DecayReport) {
    info!(
        event = "decay.completed",
        scopes = report.scopes,
        examined = report.examined,
        updated = report.updated,
        failed = report.failed,
    );
}
