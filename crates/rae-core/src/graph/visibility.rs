//! The edge-visibility predicate and traversal filters.
//!
//! Every traversal decides whether an edge exists through
//! [`is_edge_visible`]; nothing else inspects `is_active` or the validity
//! window directly.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rae_state::GraphEdge;
use serde::{Deserialize, Serialize};

/// `is_active` and, when `at` is set, `valid_from <= at <= valid_to`.
/// Open bounds are unbounded.
pub fn is_edge_visible(edge: &GraphEdge, at: Option<DateTime<Utc>>) -> bool {
    if !edge.is_active {
        return false;
    }
    let Some(at) = at else {
        return true;
    };
    let after_start = edge.valid_from.map_or(true, |from| from <= at);
    let before_end = edge.valid_to.map_or(true, |to| at <= to);
    after_start && before_end
}

/// Which way edges may be followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// source to target
    #[default]
    Forward,
    /// target to source
    Backward,
    Both,
}

/// Per-edge conditions layered on top of visibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeFilter {
    /// Empty means every relation
    pub relations: BTreeSet<String>,
    pub min_weight: f64,
    pub min_confidence: f64,
    pub at: Option<DateTime<Utc>>,
}

impl EdgeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relations.insert(relation.into());
        self
    }

    pub fn with_min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn passes(&self, edge: &GraphEdge) -> bool {
        is_edge_visible(edge, self.at)
            && (self.relations.is_empty() || self.relations.contains(&edge.relation))
            && edge.weight >= self.min_weight
            && edge.confidence >= self.min_confidence
    }
}
