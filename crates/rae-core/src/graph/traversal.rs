//! Bounded, read-only graph traversals.
//!
//! Every algorithm runs under the partition read lock, follows only edges
//! accepted by the caller's [`EdgeFilter`] (which embeds the visibility
//! predicate), never enters an inactive node, and stops with
//! `RaeError::Capacity` once the depth cap or the visit budget would be
//! exceeded.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rae_state::Scope;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::store::{GraphPartition, GraphStore};
use super::visibility::{Direction, EdgeFilter};
use crate::config::GraphConfig;
use crate::domain::{RaeError, RaeResult};
use crate::metrics::ENGINE_METRICS;

/// Floor on a single edge cost under [`PathCost::Complement`].
pub const MIN_EDGE_COST: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalAlgorithm {
    #[default]
    Bfs,
    Dfs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalOptions {
    pub max_depth: usize,
    pub filter: EdgeFilter,
    pub direction: Direction,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            filter: EdgeFilter::default(),
            direction: Direction::Forward,
        }
    }
}

impl TraversalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_filter(mut self, filter: EdgeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.filter.at = Some(at);
        self
    }
}

/// One visited node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalStep {
    pub node_id: Uuid,
    pub external_key: String,
    pub depth: usize,
    pub parent: Option<Uuid>,
    pub via_edge: Option<Uuid>,
    /// Σ(1 − weight) along the discovery path
    pub weight_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalResult {
    pub start: Uuid,
    pub algorithm: TraversalAlgorithm,
    /// Visit order, start node first
    pub steps: Vec<TraversalStep>,
    pub edges_examined: usize,
    pub max_depth_reached: usize,
}

impl TraversalResult {
    fn new(start: Uuid, algorithm: TraversalAlgorithm) -> Self {
        Self {
            start,
            algorithm,
            steps: Vec::new(),
            edges_examined: 0,
            max_depth_reached: 0,
        }
    }

    fn push(&mut self, step: TraversalStep) {
        self.max_depth_reached = self.max_depth_reached.max(step.depth);
        self.steps.push(step);
    }

    pub fn nodes_explored(&self) -> usize {
        self.steps.len()
    }

    pub fn contains(&self, node_id: Uuid) -> bool {
        self.steps.iter().any(|s| s.node_id == node_id)
    }

    pub fn node_ids(&self) -> Vec<Uuid> {
        self.steps.iter().map(|s| s.node_id).collect()
    }
}

/// Edge cost model for shortest paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCost {
    /// `1 − weight`, floored at [`MIN_EDGE_COST`]
    #[default]
    Complement,
    /// `1 / weight`; zero-weight edges are not traversable
    Inverse,
}

impl PathCost {
    fn edge_cost(&self, weight: f64) -> Option<f64> {
        match self {
            PathCost::Complement => Some((1.0 - weight).max(MIN_EDGE_COST)),
            PathCost::Inverse if weight > 0.0 => Some(1.0 / weight),
            PathCost::Inverse => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathOptions {
    pub max_depth: usize,
    pub filter: EdgeFilter,
    pub direction: Direction,
    pub cost: PathCost,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            filter: EdgeFilter::default(),
            direction: Direction::Forward,
            cost: PathCost::Complement,
        }
    }
}

impl PathOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cost(mut self, cost: PathCost) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_filter(mut self, filter: EdgeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.filter.at = Some(at);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub path_found: bool,
    pub nodes: Vec<Uuid>,
    pub node_keys: Vec<String>,
    pub edges: Vec<Uuid>,
    pub total_cost: f64,
    pub total_weight: f64,
    pub avg_confidence: f64,
    pub hops: usize,
    pub nodes_explored: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOptions {
    pub max_depth: usize,
    pub filter: EdgeFilter,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            max_depth: 50,
            filter: EdgeFilter::default(),
        }
    }
}

impl CycleOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.filter.at = Some(at);
        self
    }
}

/// Whether `source` and `target` lie on a common directed cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub has_cycle: bool,
    /// source ⇝ target, when found
    pub forward_path: Vec<Uuid>,
    /// target ⇝ source, when found
    pub return_path: Vec<Uuid>,
    /// Edges examined across both searches
    pub steps: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs traversals against a shared [`GraphStore`] within fixed limits.
#[derive(Debug, Clone)]
pub struct GraphTraversalEngine {
    store: Arc<GraphStore>,
    limits: GraphConfig,
}

impl GraphTraversalEngine {
    pub fn new(store: Arc<GraphStore>, limits: GraphConfig) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn limits(&self) -> &GraphConfig {
        &self.limits
    }

    fn check_depth(&self, max_depth: usize) -> RaeResult<()> {
        if max_depth > self.limits.max_depth_cap {
            return Err(RaeError::Capacity {
                resource: "max_depth",
                limit: self.limits.max_depth_cap,
            });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(scope = %scope, start = %start))]
    pub fn traverse(
        &self,
        scope: &Scope,
        start: Uuid,
        algorithm: TraversalAlgorithm,
        options: &TraversalOptions,
    ) -> RaeResult<TraversalResult> {
        self.check_depth(options.max_depth)?;
        ENGINE_METRICS.inc_traversals();
        let budget = self.limits.visit_budget;
        let result = self.store.read(scope, |p| match algorithm {
            TraversalAlgorithm::Bfs => bfs(p, start, options, budget),
            TraversalAlgorithm::Dfs => dfs(p, start, options, budget),
        })?;
        debug!(
            event = "graph.traversed",
            nodes = result.nodes_explored(),
            depth = result.max_depth_reached,
        );
        Ok(result)
    }

    pub fn bfs(
        &self,
        scope: &Scope,
        start: Uuid,
        options: &TraversalOptions,
    ) -> RaeResult<TraversalResult> {
        self.traverse(scope, start, TraversalAlgorithm::Bfs, options)
    }

    pub fn dfs(
        &self,
        scope: &Scope,
        start: Uuid,
        options: &TraversalOptions,
    ) -> RaeResult<TraversalResult> {
        self.traverse(scope, start, TraversalAlgorithm::Dfs, options)
    }

    /// Cheapest path from `start` to `end` using at most `max_depth` hops.
    #[instrument(skip_all, fields(scope = %scope, start = %start, end = %end))]
    pub fn shortest_path(
        &self,
        scope: &Scope,
        start: Uuid,
        end: Uuid,
        options: &PathOptions,
    ) -> RaeResult<PathResult> {
        self.check_depth(options.max_depth)?;
        ENGINE_METRICS.inc_traversals();
        let budget = self.limits.visit_budget;
        self.store
            .read(scope, |p| dijkstra(p, start, end, options, budget))
    }

    /// Report whether `source ⇝ target` and `target ⇝ source` both exist
    /// within `max_depth` hops each.
    #[instrument(skip_all, fields(scope = %scope, source = %source, target = %target))]
    pub fn detect_cycle(
        &self,
        scope: &Scope,
        source: Uuid,
        target: Uuid,
        options: &CycleOptions,
    ) -> RaeResult<CycleResult> {
        self.check_depth(options.max_depth)?;
        ENGINE_METRICS.inc_traversals();
        let budget = self.limits.visit_budget;
        self.store.read(scope, |p| {
            for id in [source, target] {
                p.node(id).ok_or_else(|| RaeError::not_found("node", id))?;
            }
            let mut result = CycleResult::default();
            let Some(forward) =
                find_path(p, source, target, options, budget, &mut result.steps)?
            else {
                return Ok(result);
            };
            if let Some(back) = find_path(p, target, source, options, budget, &mut result.steps)? {
                result.has_cycle = true;
                result.forward_path = forward;
                result.return_path = back;
            } else {
                result.forward_path = forward;
            }
            Ok(result)
        })
    }
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

fn over_budget(budget: usize) -> RaeError {
    RaeError::Capacity {
        resource: "visit_budget",
        limit: budget,
    }
}

fn root_step(p: &GraphPartition, start: Uuid) -> RaeResult<Option<TraversalStep>> {
    let node = p.node(start).ok_or_else(|| RaeError::not_found("node", start))?;
    if !node.is_active {
        return Ok(None);
    }
    Ok(Some(TraversalStep {
        node_id: start,
        external_key: node.external_key.clone(),
        depth: 0,
        parent: None,
        via_edge: None,
        weight_penalty: 0.0,
    }))
}

fn child_step(
    p: &GraphPartition,
    parent: &TraversalStep,
    next: Uuid,
    edge_id: Uuid,
    weight: f64,
) -> TraversalStep {
    TraversalStep {
        node_id: next,
        external_key: p
            .node(next)
            .map(|n| n.external_key.clone())
            .unwrap_or_default(),
        depth: parent.depth + 1,
        parent: Some(parent.node_id),
        via_edge: Some(edge_id),
        weight_penalty: parent.weight_penalty + (1.0 - weight),
    }
}

fn bfs(
    p: &GraphPartition,
    start: Uuid,
    options: &TraversalOptions,
    budget: usize,
) -> RaeResult<TraversalResult> {
    let mut result = TraversalResult::new(start, TraversalAlgorithm::Bfs);
    let Some(root) = root_step(p, start)? else {
        return Ok(result);
    };
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([root]);

    while let Some(step) = queue.pop_front() {
        if result.steps.len() >= budget {
            return Err(over_budget(budget));
        }
        if step.depth < options.max_depth {
            for (next, edge) in p.neighbors(step.node_id, options.direction, &options.filter) {
                result.edges_examined += 1;
                if seen.insert(next) {
                    queue.push_back(child_step(p, &step, next, edge.id, edge.weight));
                }
            }
        }
        result.push(step);
    }
    Ok(result)
}

fn dfs(
    p: &GraphPartition,
    start: Uuid,
    options: &TraversalOptions,
    budget: usize,
) -> RaeResult<TraversalResult> {
    let mut result = TraversalResult::new(start, TraversalAlgorithm::Dfs);
    let Some(root) = root_step(p, start)? else {
        return Ok(result);
    };
    let mut visited = HashSet::new();
    let mut stack = vec![root];

    while let Some(step) = stack.pop() {
        if !visited.insert(step.node_id) {
            continue;
        }
        if result.steps.len() >= budget {
            return Err(over_budget(budget));
        }
        if step.depth < options.max_depth {
            let neighbors = p.neighbors(step.node_id, options.direction, &options.filter);
            result.edges_examined += neighbors.len();
            for (next, edge) in neighbors.into_iter().rev() {
                if !visited.contains(&next) {
                    stack.push(child_step(p, &step, next, edge.id, edge.weight));
                }
            }
        }
        result.push(step);
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy)]
struct State {
    cost: f64,
    node: Uuid,
    hops: usize,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl Ord for State {
    // Reversed so the max-heap pops the cheapest state first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over `(node, hops)` states so the hop limit never hides a
/// cheaper-but-longer path behind a settled shorter one.
fn dijkstra(
    p: &GraphPartition,
    start: Uuid,
    end: Uuid,
    options: &PathOptions,
    budget: usize,
) -> RaeResult<PathResult> {
    let source = p.node(start).ok_or_else(|| RaeError::not_found("node", start))?;
    let target = p.node(end).ok_or_else(|| RaeError::not_found("node", end))?;
    let mut result = PathResult::default();
    if !source.is_active || !target.is_active {
        return Ok(result);
    }
    if start == end {
        result.path_found = true;
        result.nodes = vec![start];
        result.node_keys = vec![source.external_key.clone()];
        result.nodes_explored = 1;
        return Ok(result);
    }

    let mut dist: HashMap<(Uuid, usize), f64> = HashMap::from([((start, 0), 0.0)]);
    let mut prev: HashMap<(Uuid, usize), (Uuid, usize, Uuid)> = HashMap::new();
    let mut settled: HashMap<Uuid, Vec<(usize, f64)>> = HashMap::new();
    let mut heap = BinaryHeap::from([State {
        cost: 0.0,
        node: start,
        hops: 0,
    }]);

    while let Some(State { cost, node, hops }) = heap.pop() {
        if dist.get(&(node, hops)).is_some_and(|best| *best < cost) {
            continue;
        }
        let marks = settled.entry(node).or_default();
        if marks.iter().any(|(h, c)| *h <= hops && *c <= cost) {
            continue;
        }
        marks.push((hops, cost));

        result.nodes_explored += 1;
        if result.nodes_explored > budget {
            return Err(over_budget(budget));
        }
        if node == end {
            return Ok(reconstruct(p, result, &prev, start, (end, hops), cost));
        }
        if hops >= options.max_depth {
            continue;
        }
        for (next, edge) in p.neighbors(node, options.direction, &options.filter) {
            let Some(step) = options.cost.edge_cost(edge.weight) else {
                continue;
            };
            let key = (next, hops + 1);
            let next_cost = cost + step;
            if dist.get(&key).map_or(true, |best| next_cost < *best) {
                dist.insert(key, next_cost);
                prev.insert(key, (node, hops, edge.id));
                heap.push(State {
                    cost: next_cost,
                    node: next,
                    hops: hops + 1,
                });
            }
        }
    }
    Ok(result)
}

fn reconstruct(
    p: &GraphPartition,
    mut result: PathResult,
    prev: &HashMap<(Uuid, usize), (Uuid, usize, Uuid)>,
    start: Uuid,
    end_state: (Uuid, usize),
    cost: f64,
) -> PathResult {
    let mut nodes = vec![end_state.0];
    let mut edges = Vec::new();
    let mut cursor = end_state;
    while cursor != (start, 0) {
        let Some(&(node, hops, edge)) = prev.get(&cursor) else {
            break;
        };
        nodes.push(node);
        edges.push(edge);
        cursor = (node, hops);
    }
    nodes.reverse();
    edges.reverse();

    let path_edges: Vec<_> = edges.iter().filter_map(|id| p.edge(*id)).collect();
    result.path_found = true;
    result.node_keys = nodes
        .iter()
        .filter_map(|id| p.node(*id).map(|n| n.external_key.clone()))
        .collect();
    result.total_weight = path_edges.iter().map(|e| e.weight).sum();
    result.avg_confidence = if path_edges.is_empty() {
        0.0
    } else {
        path_edges.iter().map(|e| e.confidence).sum::<f64>() / path_edges.len() as f64
    };
    result.hops = edges.len();
    result.total_cost = cost;
    result.nodes = nodes;
    result.edges = edges;
    result
}

/// Bounded DFS for a directed path of at least one hop from `from` to `to`.
///
/// A node is re-entered only when reached at a strictly smaller depth than
/// before, and never while it is on the current path.
fn find_path(
    p: &GraphPartition,
    from: Uuid,
    to: Uuid,
    options: &CycleOptions,
    budget: usize,
    steps: &mut usize,
) -> RaeResult<Option<Vec<Uuid>>> {
    if options.max_depth == 0 || !p.node(from).is_some_and(|n| n.is_active) {
        return Ok(None);
    }
    let expand = |node: Uuid| -> Vec<Uuid> {
        p.neighbors(node, Direction::Forward, &options.filter)
            .into_iter()
            .map(|(next, _)| next)
            .collect()
    };

    let mut path: Vec<(Uuid, Vec<Uuid>, usize)> = vec![(from, expand(from), 0)];
    let mut on_path: HashSet<Uuid> = HashSet::from([from]);
    let mut best_depth: HashMap<Uuid, usize> = HashMap::from([(from, 0)]);

    while let Some((node, neighbors, cursor)) = path.last_mut() {
        let Some(&next) = neighbors.get(*cursor) else {
            on_path.remove(node);
            path.pop();
            continue;
        };
        *cursor += 1;
        *steps += 1;
        if *steps > budget {
            return Err(over_budget(budget));
        }

        let depth = path.len();
        if next == to {
            let mut found: Vec<Uuid> = path.iter().map(|(n, _, _)| *n).collect();
            found.push(to);
            return Ok(Some(found));
        }
        if depth >= options.max_depth || on_path.contains(&next) {
            continue;
        }
        if best_depth.get(&next).is_some_and(|d| *d <= depth) {
            continue;
        }
        best_depth.insert(next, depth);
        on_path.insert(next);
        path.push((next, expand(next), 0));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rae_state::{GraphEdge, GraphNode};

    fn scope() -> Scope {
        Scope::new("t", "p")
    }

    fn engine_with(keys: &[&str]) -> (GraphTraversalEngine, HashMap<String, Uuid>) {
        let store = Arc::new(GraphStore::new());
        let mut ids = HashMap::new();
        for key in keys {
            let node = store
                .create_node(&scope(), GraphNode::new(&scope(), *key, key.to_uppercase()))
                .unwrap();
            ids.insert(key.to_string(), node.id);
        }
        (
            GraphTraversalEngine::new(store, GraphConfig::default()),
            ids,
        )
    }

    fn link(engine: &GraphTraversalEngine, ids: &HashMap<String, Uuid>, s: &str, t: &str, w: f64) -> Uuid {
        engine
            .store()
            .create_edge(
                &scope(),
                GraphEdge::new(&scope(), ids[s], ids[t], "rel").with_weight(w),
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_bfs_respects_depth() {
        let (engine, ids) = engine_with(&["a", "b", "c", "d"]);
        link(&engine, &ids, "a", "b", 1.0);
        link(&engine, &ids, "b", "c", 1.0);
        link(&engine, &ids, "c", "d", 1.0);

        let result = engine
            .bfs(&scope(), ids["a"], &TraversalOptions::new().with_max_depth(2))
            .unwrap();
        assert_eq!(result.nodes_explored(), 3);
        assert!(!result.contains(ids["d"]));
        assert_eq!(result.max_depth_reached, 2);
    }

    #[test]
    fn test_depth_above_cap_is_capacity_error() {
        let (engine, ids) = engine_with(&["a"]);
        let err = engine
            .bfs(&scope(), ids["a"], &TraversalOptions::new().with_max_depth(51))
            .unwrap_err();
        assert!(err.suggests_reduced_scope());
    }

    #[test]
    fn test_visit_budget_enforced() {
        let store = Arc::new(GraphStore::new());
        let hub = store
            .create_node(&scope(), GraphNode::new(&scope(), "hub", "Hub"))
            .unwrap();
        for i in 0..10 {
            let leaf = store
                .create_node(&scope(), GraphNode::new(&scope(), format!("leaf{i}"), "Leaf"))
                .unwrap();
            store
                .create_edge(&scope(), GraphEdge::new(&scope(), hub.id, leaf.id, "rel"))
                .unwrap();
        }
        let engine = GraphTraversalEngine::new(
            store,
            GraphConfig {
                max_depth_cap: 50,
                visit_budget: 5,
            },
        );
        let err = engine
            .dfs(&scope(), hub.id, &TraversalOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RaeError::Capacity {
                resource: "visit_budget",
                ..
            }
        ));
    }

    #[test]
    fn test_backward_direction() {
        let (engine, ids) = engine_with(&["a", "b"]);
        link(&engine, &ids, "a", "b", 1.0);
        let fwd = engine
            .bfs(&scope(), ids["b"], &TraversalOptions::default())
            .unwrap();
        assert_eq!(fwd.nodes_explored(), 1);
        let back = engine
            .bfs(
                &scope(),
                ids["b"],
                &TraversalOptions::default().with_direction(Direction::Backward),
            )
            .unwrap();
        assert!(back.contains(ids["a"]));
    }

    #[test]
    fn test_inactive_node_not_entered() {
        let (engine, ids) = engine_with(&["a", "b", "c"]);
        link(&engine, &ids, "a", "b", 1.0);
        link(&engine, &ids, "b", "c", 1.0);
        engine.store().deactivate_node(&scope(), ids["b"]).unwrap();
        let result = engine
            .dfs(&scope(), ids["a"], &TraversalOptions::default())
            .unwrap();
        assert_eq!(result.node_ids(), vec![ids["a"]]);
    }

    #[test]
    fn test_shortest_path_prefers_heavier_edges() {
        let (engine, ids) = engine_with(&["a", "b", "c", "d"]);
        link(&engine, &ids, "a", "d", 0.1);
        link(&engine, &ids, "a", "b", 0.9);
        link(&engine, &ids, "b", "c", 0.9);
        link(&engine, &ids, "c", "d", 0.9);

        let path = engine
            .shortest_path(&scope(), ids["a"], ids["d"], &PathOptions::default())
            .unwrap();
        assert!(path.path_found);
        assert_eq!(path.node_keys, vec!["a", "b", "c", "d"]);
        assert!((path.total_cost - 0.3).abs() < 1e-9);

        // hop limit forces the direct edge
        let limited = engine
            .shortest_path(
                &scope(),
                ids["a"],
                ids["d"],
                &PathOptions::default().with_max_depth(2),
            )
            .unwrap();
        assert_eq!(limited.node_keys, vec!["a", "d"]);
    }

    #[test]
    fn test_inverse_cost_skips_zero_weight() {
        let (engine, ids) = engine_with(&["a", "b"]);
        link(&engine, &ids, "a", "b", 0.0);
        let path = engine
            .shortest_path(
                &scope(),
                ids["a"],
                ids["b"],
                &PathOptions::default().with_cost(PathCost::Inverse),
            )
            .unwrap();
        assert!(!path.path_found);
    }

    #[test]
    fn test_expired_edge_ignored_at_timestamp() {
        let (engine, ids) = engine_with(&["a", "b"]);
        let now = Utc::now();
        let edge = link(&engine, &ids, "a", "b", 1.0);
        engine
            .store()
            .set_edge_validity(&scope(), edge, None, Some(now - Duration::days(1)))
            .unwrap();

        let opts = TraversalOptions::default().at(now);
        assert!(!engine.bfs(&scope(), ids["a"], &opts).unwrap().contains(ids["b"]));
        assert!(!engine
            .shortest_path(&scope(), ids["a"], ids["b"], &PathOptions::default().at(now))
            .unwrap()
            .path_found);
        assert!(engine
            .bfs(&scope(), ids["a"], &TraversalOptions::default())
            .unwrap()
            .contains(ids["b"]));
    }

    #[test]
    fn test_cycle_detected_both_ways() {
        let (engine, ids) = engine_with(&["a", "b", "c"]);
        link(&engine, &ids, "a", "b", 1.0);
        link(&engine, &ids, "b", "c", 1.0);
        link(&engine, &ids, "c", "a", 1.0);

        let result = engine
            .detect_cycle(&scope(), ids["a"], ids["c"], &CycleOptions::default())
            .unwrap();
        assert!(result.has_cycle);
        assert_eq!(result.forward_path, vec![ids["a"], ids["b"], ids["c"]]);
        assert_eq!(result.return_path, vec![ids["c"], ids["a"]]);
    }

    #[test]
    fn test_self_cycle() {
        let (engine, ids) = engine_with(&["a", "b"]);
        link(&engine, &ids, "a", "b", 1.0);
        link(&engine, &ids, "b", "a", 1.0);
        let result = engine
            .detect_cycle(&scope(), ids["a"], ids["a"], &CycleOptions::default())
            .unwrap();
        assert!(result.has_cycle);
    }

    #[test]
    fn test_cycle_depth_limit() {
        let (engine, ids) = engine_with(&["a", "b", "c"]);
        link(&engine, &ids, "a", "b", 1.0);
        link(&engine, &ids, "b", "c", 1.0);
        link(&engine, &ids, "c", "a", 1.0);
        let result = engine
            .detect_cycle(
                &scope(),
                ids["a"],
                ids["c"],
                &CycleOptions::default().with_max_depth(1),
            )
            .unwrap();
        assert!(!result.has_cycle);
    }
}
