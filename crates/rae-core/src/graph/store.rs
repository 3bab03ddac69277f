//! Tenant-scoped graph storage.
//!
//! Nodes and edges live in flat, id-keyed maps per `(tenant, project)`
//! partition, with adjacency kept as sets of edge ids. Each partition sits
//! behind its own `RwLock`: single mutations take the write lock once and
//! are atomic, traversals hold the read lock for their whole run.
//! Every mutation bumps the partition's generation, which lets a restore
//! detect writes that landed while it was persisting a backup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rae_state::{GraphEdge, GraphNode, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::visibility::{Direction, EdgeFilter};
use crate::domain::validation::{
    check_not_empty, check_same_scope, check_scope, check_temporal_window, check_unit_interval,
};
use crate::domain::{RaeError, RaeResult};

// ---------------------------------------------------------------------------
// GraphPartition
// ---------------------------------------------------------------------------

/// Nodes and edges of one scope.
#[derive(Debug, Clone, Default)]
pub struct GraphPartition {
    nodes: BTreeMap<Uuid, GraphNode>,
    edges: BTreeMap<Uuid, GraphEdge>,
    by_key: HashMap<String, Uuid>,
    outgoing: HashMap<Uuid, BTreeSet<Uuid>>,
    incoming: HashMap<Uuid, BTreeSet<Uuid>>,
    generation: u64,
}

impl GraphPartition {
    /// Build a partition from captured records.
    ///
    /// Fails if an external key repeats or an edge references a node that is
    /// not part of `nodes`.
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> RaeResult<Self> {
        let mut partition = Self::default();
        for node in nodes {
            if partition.by_key.contains_key(&node.external_key) {
                return Err(RaeError::Conflict(format!(
                    "duplicate external_key in node set: {}",
                    node.external_key
                )));
            }
            partition.insert_node(node);
        }
        for edge in edges {
            for endpoint in [edge.source_node_id, edge.target_node_id] {
                if !partition.nodes.contains_key(&endpoint) {
                    return Err(RaeError::not_found("node", endpoint));
                }
            }
            partition.insert_edge(edge);
        }
        Ok(partition)
    }

    pub fn node(&self, id: Uuid) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn node_by_key(&self, external_key: &str) -> Option<&GraphNode> {
        self.by_key.get(external_key).and_then(|id| self.nodes.get(id))
    }

    pub fn edge(&self, id: Uuid) -> Option<&GraphEdge> {
        self.edges.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Bumped by every mutation and by every swap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn edges_of<'a>(
        &'a self,
        index: &'a HashMap<Uuid, BTreeSet<Uuid>>,
        node: Uuid,
    ) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        index
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    /// Edges whose source is `node`.
    pub fn outgoing(&self, node: Uuid) -> impl Iterator<Item = &GraphEdge> {
        self.edges_of(&self.outgoing, node)
    }

    /// Edges whose target is `node`.
    pub fn incoming(&self, node: Uuid) -> impl Iterator<Item = &GraphEdge> {
        self.edges_of(&self.incoming, node)
    }

    /// Active neighbours reachable from `node` over one edge that passes
    /// `filter`. Bidirectional edges are followed either way.
    pub fn neighbors<'a>(
        &'a self,
        node: Uuid,
        direction: Direction,
        filter: &EdgeFilter,
    ) -> Vec<(Uuid, &'a GraphEdge)> {
        let forward = matches!(direction, Direction::Forward | Direction::Both);
        let backward = matches!(direction, Direction::Backward | Direction::Both);

        let out = self
            .outgoing(node)
            .filter(|e| forward || e.bidirectional)
            .map(|e| (e.target_node_id, e));
        let inc = self
            .incoming(node)
            .filter(|e| backward || e.bidirectional)
            .map(|e| (e.source_node_id, e));

        out.chain(inc)
            .filter(|(next, edge)| {
                filter.passes(edge) && self.nodes.get(next).is_some_and(|n| n.is_active)
            })
            .collect()
    }

    fn insert_node(&mut self, node: GraphNode) {
        self.generation += 1;
        self.by_key.insert(node.external_key.clone(), node.id);
        self.nodes.insert(node.id, node);
    }

    fn insert_edge(&mut self, edge: GraphEdge) {
        self.generation += 1;
        self.outgoing
            .entry(edge.source_node_id)
            .or_default()
            .insert(edge.id);
        self.incoming
            .entry(edge.target_node_id)
            .or_default()
            .insert(edge.id);
        self.edges.insert(edge.id, edge);
    }

    fn remove_edge(&mut self, id: Uuid) -> Option<GraphEdge> {
        let edge = self.edges.remove(&id)?;
        self.generation += 1;
        if let Some(ids) = self.outgoing.get_mut(&edge.source_node_id) {
            ids.remove(&id);
        }
        if let Some(ids) = self.incoming.get_mut(&edge.target_node_id) {
            ids.remove(&id);
        }
        Some(edge)
    }

    /// Remove a node and every incident edge; returns the removed edge count.
    fn remove_node(&mut self, id: Uuid) -> Option<(GraphNode, usize)> {
        let node = self.nodes.remove(&id)?;
        self.generation += 1;
        self.by_key.remove(&node.external_key);
        let incident: BTreeSet<Uuid> = self
            .outgoing
            .remove(&id)
            .into_iter()
            .flatten()
            .chain(self.incoming.remove(&id).into_iter().flatten())
            .collect();
        let removed = incident
            .into_iter()
            .filter(|edge_id| self.remove_edge(*edge_id).is_some())
            .count();
        Some((node, removed))
    }

    fn node_mut(&mut self, id: Uuid) -> RaeResult<&mut GraphNode> {
        if self.nodes.contains_key(&id) {
            self.generation += 1;
        }
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| RaeError::not_found("node", id))
    }

    fn edge_mut(&mut self, id: Uuid) -> RaeResult<&mut GraphEdge> {
        if self.edges.contains_key(&id) {
            self.generation += 1;
        }
        self.edges
            .get_mut(&id)
            .ok_or_else(|| RaeError::not_found("edge", id))
    }

    /// Swap in `next`, keeping the generation strictly increasing across
    /// swaps.
    fn supersede(&mut self, mut next: GraphPartition) -> GraphPartition {
        next.generation = self.generation + 1;
        std::mem::replace(self, next)
    }
}

// ---------------------------------------------------------------------------
// Inputs and reports
// ---------------------------------------------------------------------------

/// What to do when a created node's external key is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Return the existing node unchanged
    #[default]
    ReturnExisting,
    /// Fail with `RaeError::Conflict`
    Reject,
}

/// Partial node update. Properties are merged key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub label: Option<String>,
    pub properties: BTreeMap<String, Value>,
    pub remove_properties: Vec<String>,
}

impl NodeUpdate {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn without_property(mut self, key: impl Into<String>) -> Self {
        self.remove_properties.push(key.into());
        self
    }
}

/// Partial edge update. Properties and metadata are merged key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeUpdate {
    pub relation: Option<String>,
    pub weight: Option<f64>,
    pub confidence: Option<f64>,
    pub bidirectional: Option<bool>,
    pub properties: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, Value>,
}

impl EdgeUpdate {
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = Some(bidirectional);
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

    fn validate(&self) -> RaeResult<()> {
        if let Some(relation) = &self.relation {
            check_not_empty("relation", relation)?;
        }
        if let Some(weight) = self.weight {
            check_unit_interval("weight", weight)?;
        }
        if let Some(confidence) = self.confidence {
            check_unit_interval("confidence", confidence)?;
        }
        Ok(())
    }
}

/// Failure of one item in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub index: usize,
    pub message: String,
}

/// Outcome of a non-atomic batch create.
///
/// `created_ids` holds, in input order, the id every successful item
/// resolved to (an existing node for a duplicate key).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub created_count: usize,
    pub failed_count: usize,
    pub errors: Vec<BatchItemError>,
    pub created_ids: Vec<Uuid>,
}

impl BatchReport {
    fn record(&mut self, index: usize, result: RaeResult<Uuid>) {
        match result {
            Ok(id) => {
                self.created_count += 1;
                self.created_ids.push(id);
            }
            Err(err) => {
                self.failed_count += 1;
                self.errors.push(BatchItemError {
                    index,
                    message: err.to_string(),
                });
            }
        }
    }
}

/// Aggregate figures over one partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub total_edges: usize,
    pub active_edges: usize,
    pub unique_relations: usize,
    pub bidirectional_edges: usize,
    /// Over active edges
    pub avg_edge_weight: f64,
    /// Over active edges
    pub avg_confidence: f64,
    /// Active edge endpoints per node
    pub avg_node_degree: f64,
    pub latest_node_created: Option<DateTime<Utc>>,
    pub latest_edge_created: Option<DateTime<Utc>>,
    pub snapshot_count: usize,
    pub latest_snapshot: Option<DateTime<Utc>>,
}

/// Degree figures of one node over its active edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDegreeMetrics {
    pub node_id: Uuid,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
    pub weighted_in_degree: f64,
    pub weighted_out_degree: f64,
}

/// Outcome of an additive merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub nodes_added: usize,
    pub nodes_skipped: usize,
    pub edges_added: usize,
    pub edges_skipped: usize,
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

enum EdgeInsertError {
    Domain(RaeError),
    MissingEndpoint(Uuid),
}

impl From<RaeError> for EdgeInsertError {
    fn from(err: RaeError) -> Self {
        EdgeInsertError::Domain(err)
    }
}

/// All graph partitions, keyed by scope.
#[derive(Debug, Default)]
pub struct GraphStore {
    partitions: RwLock<HashMap<Scope, Arc<RwLock<GraphPartition>>>>,
    duplicate_policy: DuplicateKeyPolicy,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    fn existing(&self, scope: &Scope) -> Option<Arc<RwLock<GraphPartition>>> {
        self.partitions.read().get(scope).cloned()
    }

    fn handle(&self, scope: &Scope) -> Arc<RwLock<GraphPartition>> {
        if let Some(handle) = self.existing(scope) {
            return handle;
        }
        self.partitions
            .write()
            .entry(scope.clone())
            .or_default()
            .clone()
    }

    /// Run `f` against the partition under its read lock. Unknown scopes
    /// read as empty.
    pub fn read<R>(&self, scope: &Scope, f: impl FnOnce(&GraphPartition) -> R) -> R {
        match self.existing(scope) {
            Some(handle) => f(&handle.read()),
            None => f(&GraphPartition::default()),
        }
    }

    fn write<R>(&self, scope: &Scope, f: impl FnOnce(&mut GraphPartition) -> R) -> R {
        let handle = self.handle(scope);
        let mut guard = handle.write();
        f(&mut guard)
    }

    /// Like `write`, but an unknown scope yields `None` instead of a new
    /// empty partition.
    fn write_existing<R>(&self, scope: &Scope, f: impl FnOnce(&mut GraphPartition) -> R) -> Option<R> {
        let handle = self.existing(scope)?;
        let mut guard = handle.write();
        Some(f(&mut guard))
    }

    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.partitions.read().keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Scope other than `scope` that owns `node_id`, if any.
    fn foreign_owner(&self, scope: &Scope, node_id: Uuid) -> Option<Scope> {
        let handles: Vec<(Scope, Arc<RwLock<GraphPartition>>)> = self
            .partitions
            .read()
            .iter()
            .filter(|(s, _)| *s != scope)
            .map(|(s, h)| (s.clone(), h.clone()))
            .collect();
        handles
            .into_iter()
            .find(|(_, h)| h.read().node(node_id).is_some())
            .map(|(s, _)| s)
    }

    // -- nodes --------------------------------------------------------------

    /// Create a node, or return the node already holding its external key
    /// under `DuplicateKeyPolicy::ReturnExisting`.
    pub fn create_node(&self, scope: &Scope, node: GraphNode) -> RaeResult<GraphNode> {
        check_scope(scope)?;
        check_same_scope("node", scope, &node.tenant_id, &node.project_id)?;
        check_not_empty("external_key", &node.external_key)?;
        let policy = self.duplicate_policy;
        self.write(scope, |p| {
            if let Some(existing) = p.node_by_key(&node.external_key) {
                return match policy {
                    DuplicateKeyPolicy::ReturnExisting => Ok(existing.clone()),
                    DuplicateKeyPolicy::Reject => Err(RaeError::Conflict(format!(
                        "external_key already exists: {}",
                        node.external_key
                    ))),
                };
            }
            if p.node(node.id).is_some() {
                return Err(RaeError::Conflict(format!("node id already exists: {}", node.id)));
            }
            p.insert_node(node.clone());
            Ok(node)
        })
    }

    pub fn get_node(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphNode> {
        self.read(scope, |p| p.node(id).cloned())
            .ok_or_else(|| RaeError::not_found("node", id))
    }

    pub fn get_node_by_key(&self, scope: &Scope, external_key: &str) -> RaeResult<GraphNode> {
        self.read(scope, |p| p.node_by_key(external_key).cloned())
            .ok_or_else(|| RaeError::not_found("node", external_key))
    }

    pub fn list_nodes(&self, scope: &Scope) -> Vec<GraphNode> {
        self.read(scope, |p| p.nodes().cloned().collect())
    }

    pub fn update_node(&self, scope: &Scope, id: Uuid, update: NodeUpdate) -> RaeResult<GraphNode> {
        if let Some(label) = &update.label {
            check_not_empty("label", label)?;
        }
        self.write_existing(scope, |p| {
            let node = p.node_mut(id)?;
            if let Some(label) = update.label {
                node.label = label;
            }
            node.properties.extend(update.properties);
            for key in &update.remove_properties {
                node.properties.remove(key);
            }
            Ok(node.clone())
        })
        .unwrap_or_else(|| Err(RaeError::not_found("node", id)))
    }

    pub fn set_node_active(&self, scope: &Scope, id: Uuid, active: bool) -> RaeResult<GraphNode> {
        self.write_existing(scope, |p| {
            let node = p.node_mut(id)?;
            node.is_active = active;
            Ok(node.clone())
        })
        .unwrap_or_else(|| Err(RaeError::not_found("node", id)))
    }

    pub fn deactivate_node(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphNode> {
        self.set_node_active(scope, id, false)
    }

    pub fn activate_node(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphNode> {
        self.set_node_active(scope, id, true)
    }

    /// Permanently remove a node and its incident edges. Returns the number
    /// of edges removed with it.
    pub fn delete_node(&self, scope: &Scope, id: Uuid) -> RaeResult<usize> {
        let removed = self
            .write_existing(scope, |p| p.remove_node(id))
            .flatten()
            .map(|(_, edges)| edges)
            .ok_or_else(|| RaeError::not_found("node", id))?;
        debug!(event = "graph.node_deleted", scope = %scope, node_id = %id, edges_removed = removed);
        Ok(removed)
    }

    pub fn batch_create_nodes(&self, scope: &Scope, nodes: Vec<GraphNode>) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, node) in nodes.into_iter().enumerate() {
            report.record(index, self.create_node(scope, node).map(|n| n.id));
        }
        report
    }

    // -- edges --------------------------------------------------------------

    fn validate_edge(scope: &Scope, edge: &GraphEdge) -> RaeResult<()> {
        check_scope(scope)?;
        check_same_scope("edge", scope, &edge.tenant_id, &edge.project_id)?;
        check_not_empty("relation", &edge.relation)?;
        check_unit_interval("weight", edge.weight)?;
        check_unit_interval("confidence", edge.confidence)?;
        check_temporal_window(edge.valid_from, edge.valid_to)?;
        Ok(())
    }

    /// Create an edge. Weight and confidence must lie in [0, 1] and both
    /// endpoints must exist in `scope`.
    pub fn create_edge(&self, scope: &Scope, edge: GraphEdge) -> RaeResult<GraphEdge> {
        Self::validate_edge(scope, &edge)?;
        let source = edge.source_node_id;
        let insert = |p: &mut GraphPartition| -> Result<GraphEdge, EdgeInsertError> {
            for endpoint in [edge.source_node_id, edge.target_node_id] {
                if p.node(endpoint).is_none() {
                    return Err(EdgeInsertError::MissingEndpoint(endpoint));
                }
            }
            if p.edge(edge.id).is_some() {
                return Err(RaeError::Conflict(format!("edge id already exists: {}", edge.id)).into());
            }
            p.insert_edge(edge.clone());
            Ok(edge)
        };
        let inserted = self
            .write_existing(scope, insert)
            .unwrap_or(Err(EdgeInsertError::MissingEndpoint(source)));
        match inserted {
            Ok(edge) => Ok(edge),
            Err(EdgeInsertError::Domain(err)) => Err(err),
            Err(EdgeInsertError::MissingEndpoint(node_id)) => {
                match self.foreign_owner(scope, node_id) {
                    Some(owner) => Err(crate::domain::ValidationError::CrossScope {
                        what: format!("node {node_id}"),
                        expected: scope.to_string(),
                        found: owner.to_string(),
                    }
                    .into()),
                    None => Err(RaeError::not_found("node", node_id)),
                }
            }
        }
    }

    pub fn get_edge(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphEdge> {
        self.read(scope, |p| p.edge(id).cloned())
            .ok_or_else(|| RaeError::not_found("edge", id))
    }

    pub fn list_edges(&self, scope: &Scope) -> Vec<GraphEdge> {
        self.read(scope, |p| p.edges().cloned().collect())
    }

    fn mutate_edge(
        &self,
        scope: &Scope,
        id: Uuid,
        f: impl FnOnce(&mut GraphEdge),
    ) -> RaeResult<GraphEdge> {
        self.write_existing(scope, |p| {
            let edge = p.edge_mut(id)?;
            f(edge);
            Ok(edge.clone())
        })
        .unwrap_or_else(|| Err(RaeError::not_found("edge", id)))
    }

    /// Apply a partial update. Out-of-range weight or confidence is
    /// rejected before anything changes.
    pub fn update_edge(&self, scope: &Scope, id: Uuid, update: EdgeUpdate) -> RaeResult<GraphEdge> {
        update.validate()?;
        self.mutate_edge(scope, id, |edge| {
            if let Some(relation) = update.relation {
                edge.relation = relation;
            }
            if let Some(weight) = update.weight {
                edge.weight = weight;
            }
            if let Some(confidence) = update.confidence {
                edge.confidence = confidence;
            }
            if let Some(bidirectional) = update.bidirectional {
                edge.bidirectional = bidirectional;
            }
            edge.properties.extend(update.properties);
            edge.metadata.extend(update.metadata);
            edge.updated_at = Utc::now();
        })
    }

    pub fn set_edge_validity(
        &self,
        scope: &Scope,
        id: Uuid,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> RaeResult<GraphEdge> {
        check_temporal_window(valid_from, valid_to)?;
        self.mutate_edge(scope, id, |edge| {
            edge.valid_from = valid_from;
            edge.valid_to = valid_to;
            edge.updated_at = Utc::now();
        })
    }

    /// Flip `is_active` and nothing else.
    pub fn set_edge_active(&self, scope: &Scope, id: Uuid, active: bool) -> RaeResult<GraphEdge> {
        self.mutate_edge(scope, id, |edge| edge.is_active = active)
    }

    pub fn deactivate_edge(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphEdge> {
        self.set_edge_active(scope, id, false)
    }

    pub fn activate_edge(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphEdge> {
        self.set_edge_active(scope, id, true)
    }

    /// Permanently remove an edge.
    pub fn delete_edge(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphEdge> {
        self.write_existing(scope, |p| p.remove_edge(id))
            .flatten()
            .ok_or_else(|| RaeError::not_found("edge", id))
    }

    pub fn batch_create_edges(&self, scope: &Scope, edges: Vec<GraphEdge>) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, edge) in edges.into_iter().enumerate() {
            report.record(index, self.create_edge(scope, edge).map(|e| e.id));
        }
        report
    }

    // -- aggregates ---------------------------------------------------------

    /// Partition statistics. Snapshot fields are left empty here; the
    /// snapshot layer fills them in.
    pub fn statistics(&self, scope: &Scope) -> GraphStatistics {
        self.read(scope, |p| {
            let active: Vec<&GraphEdge> = p.edges().filter(|e| e.is_active).collect();
            let relations: BTreeSet<&str> = p.edges().map(|e| e.relation.as_str()).collect();
            let mean = |f: fn(&GraphEdge) -> f64| {
                if active.is_empty() {
                    0.0
                } else {
                    active.iter().map(|&e| f(e)).sum::<f64>() / active.len() as f64
                }
            };
            GraphStatistics {
                total_nodes: p.node_count(),
                active_nodes: p.nodes().filter(|n| n.is_active).count(),
                total_edges: p.edge_count(),
                active_edges: active.len(),
                unique_relations: relations.len(),
                bidirectional_edges: p.edges().filter(|e| e.bidirectional).count(),
                avg_edge_weight: mean(|e| e.weight),
                avg_confidence: mean(|e| e.confidence),
                avg_node_degree: if p.is_empty() {
                    0.0
                } else {
                    2.0 * active.len() as f64 / p.node_count() as f64
                },
                latest_node_created: p.nodes().map(|n| n.created_at).max(),
                latest_edge_created: p.edges().map(|e| e.created_at).max(),
                snapshot_count: 0,
                latest_snapshot: None,
            }
        })
    }

    pub fn node_metrics(&self, scope: &Scope, id: Uuid) -> RaeResult<NodeDegreeMetrics> {
        self.read(scope, |p| {
            p.node(id)?;
            let out: Vec<&GraphEdge> = p.outgoing(id).filter(|e| e.is_active).collect();
            let inc: Vec<&GraphEdge> = p.incoming(id).filter(|e| e.is_active).collect();
            Some(NodeDegreeMetrics {
                node_id: id,
                in_degree: inc.len(),
                out_degree: out.len(),
                total_degree: inc.len() + out.len(),
                weighted_in_degree: inc.iter().map(|e| e.weight).sum(),
                weighted_out_degree: out.iter().map(|e| e.weight).sum(),
            })
        })
        .ok_or_else(|| RaeError::not_found("node", id))
    }

    // -- bulk state ---------------------------------------------------------

    /// Copy of all nodes and the selected edges, taken under one read lock.
    pub fn capture(
        &self,
        scope: &Scope,
        include_inactive_edges: bool,
    ) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        self.read(scope, |p| {
            (
                p.nodes().cloned().collect(),
                p.edges()
                    .filter(|e| include_inactive_edges || e.is_active)
                    .cloned()
                    .collect(),
            )
        })
    }

    /// Every node and edge together with the partition generation they were
    /// read at.
    pub fn capture_versioned(&self, scope: &Scope) -> (u64, Vec<GraphNode>, Vec<GraphEdge>) {
        self.read(scope, |p| {
            (
                p.generation(),
                p.nodes().cloned().collect(),
                p.edges().cloned().collect(),
            )
        })
    }

    /// Swap in `next` under the partition's write lock and hand back the
    /// previous contents.
    pub fn replace_partition(&self, scope: &Scope, next: GraphPartition) -> GraphPartition {
        self.write(scope, |p| p.supersede(next))
    }

    /// Swap in `next` only if the partition is still at `expected`
    /// generation. On mismatch nothing changes and `next` is handed back.
    pub fn replace_partition_if(
        &self,
        scope: &Scope,
        expected: u64,
        next: GraphPartition,
    ) -> Result<GraphPartition, GraphPartition> {
        self.write(scope, |p| {
            if p.generation() == expected {
                Ok(p.supersede(next))
            } else {
                Err(next)
            }
        })
    }

    /// Additive merge with skip-existing semantics: nodes whose external key
    /// exists are skipped and edges pointing at them are remapped to the
    /// existing node; edges whose id exists are skipped.
    pub fn merge(&self, scope: &Scope, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> MergeOutcome {
        self.write(scope, |p| {
            let mut outcome = MergeOutcome::default();
            let mut remap: HashMap<Uuid, Uuid> = HashMap::new();
            for node in nodes {
                if let Some(existing) = p.node_by_key(&node.external_key) {
                    remap.insert(node.id, existing.id);
                    outcome.nodes_skipped += 1;
                } else if p.node(node.id).is_some() {
                    outcome.nodes_skipped += 1;
                } else {
                    p.insert_node(node);
                    outcome.nodes_added += 1;
                }
            }
            for mut edge in edges {
                if p.edge(edge.id).is_some() {
                    outcome.edges_skipped += 1;
                    continue;
                }
                if let Some(id) = remap.get(&edge.source_node_id) {
                    edge.source_node_id = *id;
                }
                if let Some(id) = remap.get(&edge.target_node_id) {
                    edge.target_node_id = *id;
                }
                if p.node(edge.source_node_id).is_none() || p.node(edge.target_node_id).is_none() {
                    outcome.edges_skipped += 1;
                    continue;
                }
                p.insert_edge(edge);
                outcome.edges_added += 1;
            }
            outcome
        })
    }
}
