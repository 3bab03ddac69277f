//! Logical schema for RAE records
//!
//! Records:
//! - `MemoryItem`: one unit of agent experience in a memory layer
//! - `GraphNode` / `GraphEdge`: the temporal knowledge graph
//! - `GraphSnapshot`: immutable capture of one partition of the graph
//!
//! Every record carries `tenant_id` and `project_id`. The pair is the
//! partition key; nothing here validates it further.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::storage_traits::ContentDigest;

/// Default weight of a freshly created edge.
pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Default confidence of a freshly created edge.
pub const DEFAULT_EDGE_CONFIDENCE: f64 = 0.8;

/// Default importance of a memory item stored without one.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Tenant/project partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub project_id: String,
}

impl Scope {
    pub fn new(tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
        }
    }

    /// True if the record identified by `(tenant_id, project_id)` lives here.
    pub fn contains(&self, tenant_id: &str, project_id: &str) -> bool {
        self.tenant_id == tenant_id && self.project_id == project_id
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.project_id)
    }
}

// ---------------------------------------------------------------------------
// Memory items
// ---------------------------------------------------------------------------

/// Lifecycle layer of a memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    Episodic,
    Working,
    Semantic,
    Reflective,
}

impl MemoryLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLayer::Episodic => "episodic",
            MemoryLayer::Working => "working",
            MemoryLayer::Semantic => "semantic",
            MemoryLayer::Reflective => "reflective",
        }
    }
}

impl fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "episodic" => Ok(MemoryLayer::Episodic),
            "working" => Ok(MemoryLayer::Working),
            "semantic" => Ok(MemoryLayer::Semantic),
            "reflective" => Ok(MemoryLayer::Reflective),
            other => Err(format!("unknown memory layer: {other}")),
        }
    }
}

/// A stored unit of agent experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: String,
    pub layer: MemoryLayer,
    pub content: String,
    /// Embedding supplied by the caller or by an `EmbeddingProvider`
    pub embedding: Option<Vec<f32>>,
    /// Always within [0, 1]
    pub importance: f64,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub source: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    /// SHA-256 of `content`
    pub content_digest: ContentDigest,
}

impl MemoryItem {
    pub fn new(scope: &Scope, layer: MemoryLayer, content: impl Into<String>) -> Self {
        let content = content.into();
        let content_digest = ContentDigest::from_bytes(content.as_bytes());
        Self {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            layer,
            content,
            embedding: None,
            importance: DEFAULT_IMPORTANCE,
            tags: BTreeSet::new(),
            created_at: Utc::now(),
            last_accessed_at: None,
            usage_count: 0,
            source: None,
            metadata: BTreeMap::new(),
            content_digest,
        }
    }

    /// Set importance, clamped to [0, 1]. NaN becomes 0.
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_last_accessed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed_at = Some(at);
        self
    }

    pub fn with_usage_count(mut self, usage_count: u64) -> Self {
        self.usage_count = usage_count;
        self
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.project_id.clone())
    }

    /// Timestamp recency is measured from.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    /// Record one access.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_accessed_at = Some(at);
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Graph records
// ---------------------------------------------------------------------------

/// A node of the knowledge graph.
///
/// `(tenant_id, project_id, external_key)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: String,
    pub external_key: String,
    pub label: String,
    pub properties: BTreeMap<String, Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn new(scope: &Scope, external_key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            external_key: external_key.into(),
            label: label.into(),
            properties: BTreeMap::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Link this node to a memory item.
    pub fn with_memory(self, memory_id: Uuid) -> Self {
        self.with_property("memory_id", Value::String(memory_id.to_string()))
    }

    /// Memory items referenced through the `memory_id` and `memory_ids`
    /// properties. Unparseable entries are ignored.
    pub fn memory_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        if let Some(Value::String(raw)) = self.properties.get("memory_id") {
            if let Ok(id) = Uuid::parse_str(raw) {
                ids.push(id);
            }
        }
        if let Some(Value::Array(values)) = self.properties.get("memory_ids") {
            for value in values {
                if let Some(id) = value.as_str().and_then(|raw| Uuid::parse_str(raw).ok()) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.project_id.clone())
    }
}

/// A directed, optionally time-bounded relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: String,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    pub relation: String,
    pub weight: f64,
    pub confidence: f64,
    pub bidirectional: bool,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub properties: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphEdge {
    pub fn new(scope: &Scope, source: Uuid, target: Uuid, relation: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            source_node_id: source,
            target_node_id: target,
            relation: relation.into(),
            weight: DEFAULT_EDGE_WEIGHT,
            confidence: DEFAULT_EDGE_CONFIDENCE,
            bidirectional: false,
            is_active: true,
            valid_from: None,
            valid_to: None,
            properties: BTreeMap::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn valid_between(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_to = valid_to;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Endpoint reached when leaving `from` along this edge, if `from` is
    /// one of its endpoints.
    pub fn other_end(&self, from: Uuid) -> Option<Uuid> {
        if self.source_node_id == from {
            Some(self.target_node_id)
        } else if self.target_node_id == from {
            Some(self.source_node_id)
        } else {
            None
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.project_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Immutable point-in-time capture of one graph partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub tags: BTreeSet<String>,
    /// Whether deactivated edges were captured
    pub include_inactive_edges: bool,
}

impl GraphSnapshot {
    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.project_id.clone())
    }

    /// Digest over the serialized node and edge sets.
    pub fn content_digest(&self) -> Result<ContentDigest, serde_json::Error> {
        let bytes = serde_json::to_vec(&(&self.nodes, &self.edges))?;
        Ok(ContentDigest::from_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_clamped() {
        let scope = Scope::new("t", "p");
        assert_eq!(
            MemoryItem::new(&scope, MemoryLayer::Working, "x")
                .with_importance(1.7)
                .importance,
            1.0
        );
        assert_eq!(
            MemoryItem::new(&scope, MemoryLayer::Working, "x")
                .with_importance(-0.2)
                .importance,
            0.0
        );
        assert_eq!(
            MemoryItem::new(&scope, MemoryLayer::Working, "x")
                .with_importance(f64::NAN)
                .importance,
            0.0
        );
    }

    #[test]
    fn content_digest_tracks_content() {
        let scope = Scope::new("t", "p");
        let a = MemoryItem::new(&scope, MemoryLayer::Episodic, "same");
        let b = MemoryItem::new(&scope, MemoryLayer::Semantic, "same");
        assert_eq!(a.content_digest, b.content_digest);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn node_memory_ids_merge_both_properties() {
        let scope = Scope::new("t", "p");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let node = GraphNode::new(&scope, "k", "K")
            .with_memory(first)
            .with_property(
                "memory_ids",
                serde_json::json!([first.to_string(), second.to_string(), "garbage"]),
            );
        assert_eq!(node.memory_ids(), vec![first, second]);
    }

    #[test]
    fn edge_defaults() {
        let scope = Scope::new("t", "p");
        let edge = GraphEdge::new(&scope, Uuid::new_v4(), Uuid::new_v4(), "rel");
        assert_eq!(edge.weight, DEFAULT_EDGE_WEIGHT);
        assert_eq!(edge.confidence, DEFAULT_EDGE_CONFIDENCE);
        assert!(edge.is_active);
        assert!(!edge.bidirectional);
    }

    #[test]
    fn layer_parses_case_insensitively() {
        assert_eq!("Reflective".parse::<MemoryLayer>(), Ok(MemoryLayer::Reflective));
        assert!("procedural".parse::<MemoryLayer>().is_err());
    }
}
