//! Integration tests for graph storage, visibility and traversals.

use std::sync::Arc;

use chrono::{Duration, Utc};

use rae_core::graph::{
    CycleOptions, Direction, EdgeFilter, EdgeUpdate, GraphStore, GraphTraversalEngine, PathCost,
    PathOptions, TraversalAlgorithm, TraversalOptions,
};
use rae_core::{GraphConfig, RaeError, ValidationError};
use rae_state::{GraphEdge, GraphNode, Scope};
use uuid::Uuid;

fn scope() -> Scope {
    Scope::new("acme", "kg")
}

fn engine() -> GraphTraversalEngine {
    GraphTraversalEngine::new(Arc::new(GraphStore::new()), GraphConfig::default())
}

fn node(engine: &GraphTraversalEngine, key: &str) -> Uuid {
    engine
        .store()
        .create_node(&scope(), GraphNode::new(&scope(), key, key.to_uppercase()))
        .unwrap()
        .id
}

fn edge(engine: &GraphTraversalEngine, from: Uuid, to: Uuid, weight: f64) -> Uuid {
    engine
        .store()
        .create_edge(
            &scope(),
            GraphEdge::new(&scope(), from, to, "links").with_weight(weight),
        )
        .unwrap()
        .id
}

#[test]
fn scenario_b_shortest_path_and_no_cycle() {
    let g = engine();
    let (a, b, c) = (node(&g, "a"), node(&g, "b"), node(&g, "c"));
    edge(&g, a, b, 0.9);
    edge(&g, b, c, 0.8);

    let path = g
        .shortest_path(&scope(), a, c, &PathOptions::default())
        .unwrap();
    assert!(path.path_found);
    assert_eq!(path.nodes, vec![a, b, c]);
    assert_eq!(path.node_keys, vec!["a", "b", "c"]);
    assert_eq!(path.hops, 2);
    assert!((path.total_cost - 0.3).abs() < 1e-9);
    assert!((path.total_weight - 1.7).abs() < 1e-9);

    let cycle = g
        .detect_cycle(&scope(), c, a, &CycleOptions::default())
        .unwrap();
    assert!(!cycle.has_cycle);
}

#[test]
fn scenario_c_deactivate_and_reactivate() {
    let g = engine();
    let (a, b) = (node(&g, "a"), node(&g, "b"));
    let ab = edge(&g, a, b, 1.0);
    let opts = TraversalOptions::new();

    assert!(g.bfs(&scope(), a, &opts).unwrap().contains(b));

    g.store().deactivate_edge(&scope(), ab).unwrap();
    let result = g.bfs(&scope(), a, &opts).unwrap();
    assert!(!result.contains(b));
    assert_eq!(result.nodes_explored(), 1);

    g.store().activate_edge(&scope(), ab).unwrap();
    assert!(g.bfs(&scope(), a, &opts).unwrap().contains(b));
}

#[test]
fn temporally_invalid_edges_are_invisible_at_time() {
    let g = engine();
    let (a, b) = (node(&g, "a"), node(&g, "b"));
    let now = Utc::now();
    g.store()
        .create_edge(
            &scope(),
            GraphEdge::new(&scope(), a, b, "was_part_of")
                .valid_between(Some(now - Duration::days(30)), Some(now - Duration::days(10))),
        )
        .unwrap();

    let today = TraversalOptions::new().at(now);
    assert!(!g.bfs(&scope(), a, &today).unwrap().contains(b));

    let then = TraversalOptions::new().at(now - Duration::days(20));
    assert!(g.bfs(&scope(), a, &then).unwrap().contains(b));

    let path = g
        .shortest_path(&scope(), a, b, &PathOptions::default().at(now))
        .unwrap();
    assert!(!path.path_found);

    // without a timestamp only is_active matters
    assert!(g.bfs(&scope(), a, &TraversalOptions::new()).unwrap().contains(b));
}

#[test]
fn expired_back_edge_closes_no_cycle_and_hides_from_dfs() {
    let g = engine();
    let (a, b) = (node(&g, "a"), node(&g, "b"));
    let now = Utc::now();
    edge(&g, a, b, 0.5);
    g.store()
        .create_edge(
            &scope(),
            GraphEdge::new(&scope(), b, a, "reported_to")
                .valid_between(Some(now - Duration::days(30)), Some(now - Duration::days(1))),
        )
        .unwrap();

    let today = TraversalOptions::new().at(now);
    assert!(!g.dfs(&scope(), b, &today).unwrap().contains(a));
    let last_week = TraversalOptions::new().at(now - Duration::days(7));
    assert!(g.dfs(&scope(), b, &last_week).unwrap().contains(a));

    let cycle = g
        .detect_cycle(&scope(), a, b, &CycleOptions::default().at(now))
        .unwrap();
    assert!(!cycle.has_cycle);
    assert!(cycle.return_path.is_empty());

    let historic = g
        .detect_cycle(&scope(), a, b, &CycleOptions::default().at(now - Duration::days(7)))
        .unwrap();
    assert!(historic.has_cycle);
    assert_eq!(historic.return_path, vec![b, a]);
}

#[test]
fn dijkstra_prefers_cheaper_longer_path() {
    let g = engine();
    let (s, m, t) = (node(&g, "s"), node(&g, "m"), node(&g, "t"));
    // direct edge costs 0.9, the detour 0.05 + 0.05
    edge(&g, s, t, 0.1);
    edge(&g, s, m, 0.95);
    edge(&g, m, t, 0.95);

    let path = g
        .shortest_path(&scope(), s, t, &PathOptions::default())
        .unwrap();
    assert_eq!(path.nodes, vec![s, m, t]);
    assert!((path.total_cost - 0.1).abs() < 1e-9);

    // one hop allowed: only the direct edge qualifies
    let capped = g
        .shortest_path(&scope(), s, t, &PathOptions::default().with_max_depth(1))
        .unwrap();
    assert_eq!(capped.nodes, vec![s, t]);

    let inverse = g
        .shortest_path(
            &scope(),
            s,
            t,
            &PathOptions::default().with_cost(PathCost::Inverse),
        )
        .unwrap();
    assert_eq!(inverse.nodes, vec![s, m, t]);
}

#[test]
fn cycle_detection_terminates_on_dense_graph() {
    let g = engine();
    let ids: Vec<Uuid> = (0..40).map(|i| node(&g, &format!("n{i}"))).collect();
    for &from in &ids {
        for &to in &ids {
            if from != to {
                edge(&g, from, to, 0.5);
            }
        }
    }
    let result = g
        .detect_cycle(&scope(), ids[0], ids[39], &CycleOptions::default())
        .unwrap();
    assert!(result.has_cycle);
    assert_eq!(result.forward_path.first(), Some(&ids[0]));
    assert_eq!(result.forward_path.last(), Some(&ids[39]));

    let bfs = g.bfs(&scope(), ids[0], &TraversalOptions::new().with_max_depth(3)).unwrap();
    assert_eq!(bfs.nodes_explored(), 40);
}

#[test]
fn visit_budget_and_depth_cap_report_capacity() {
    let store = Arc::new(GraphStore::new());
    let g = GraphTraversalEngine::new(
        store,
        GraphConfig {
            max_depth_cap: 50,
            visit_budget: 5,
        },
    );
    let ids: Vec<Uuid> = (0..10).map(|i| node(&g, &format!("n{i}"))).collect();
    for pair in ids.windows(2) {
        edge(&g, pair[0], pair[1], 1.0);
    }

    let err = g
        .bfs(&scope(), ids[0], &TraversalOptions::new().with_max_depth(20))
        .unwrap_err();
    assert!(matches!(err, RaeError::Capacity { resource: "visit_budget", .. }));
    assert!(err.suggests_reduced_scope());

    let err = g
        .bfs(&scope(), ids[0], &TraversalOptions::new().with_max_depth(51))
        .unwrap_err();
    assert!(matches!(err, RaeError::Capacity { resource: "max_depth", .. }));
}

#[test]
fn out_of_range_weights_are_rejected() {
    let g = engine();
    let (a, b) = (node(&g, "a"), node(&g, "b"));
    let err = g
        .store()
        .create_edge(&scope(), GraphEdge::new(&scope(), a, b, "r").with_weight(1.5))
        .unwrap_err();
    assert!(matches!(
        err,
        RaeError::Validation(ValidationError::OutOfRange { field: "weight", .. })
    ));

    let id = edge(&g, a, b, 0.5);
    let err = g
        .store()
        .update_edge(&scope(), id, EdgeUpdate::default().with_confidence(-0.1))
        .unwrap_err();
    assert!(matches!(err, RaeError::Validation(_)));
    assert_eq!(g.store().get_edge(&scope(), id).unwrap().confidence, 0.8);
}

#[test]
fn direction_and_filters() {
    let g = engine();
    let (a, b, c) = (node(&g, "a"), node(&g, "b"), node(&g, "c"));
    edge(&g, a, b, 0.9);
    g.store()
        .create_edge(
            &scope(),
            GraphEdge::new(&scope(), c, b, "mentions").with_weight(0.2),
        )
        .unwrap();

    let backward = TraversalOptions::new().with_direction(Direction::Backward);
    assert!(!g.bfs(&scope(), b, &TraversalOptions::new()).unwrap().contains(a));
    assert!(g.bfs(&scope(), b, &backward).unwrap().contains(a));

    let heavy_only = TraversalOptions::new()
        .with_direction(Direction::Both)
        .with_filter(EdgeFilter::new().with_min_weight(0.5));
    let result = g.bfs(&scope(), b, &heavy_only).unwrap();
    assert!(result.contains(a));
    assert!(!result.contains(c));

    let links_only = TraversalOptions::new()
        .with_direction(Direction::Both)
        .with_filter(EdgeFilter::new().with_relation("mentions"));
    let result = g.traverse(&scope(), b, TraversalAlgorithm::Dfs, &links_only).unwrap();
    assert_eq!(result.node_ids(), vec![b, c]);
}

#[test]
fn partitions_are_isolated() {
    let g = engine();
    let a = node(&g, "a");
    let other = Scope::new("acme", "other");
    let foreign = g
        .store()
        .create_node(&other, GraphNode::new(&other, "x", "X"))
        .unwrap();

    let err = g
        .store()
        .create_edge(&scope(), GraphEdge::new(&scope(), a, foreign.id, "r"))
        .unwrap_err();
    assert!(matches!(err, RaeError::Validation(ValidationError::CrossScope { .. })));

    let err = g.bfs(&other, a, &TraversalOptions::new()).unwrap_err();
    assert!(matches!(err, RaeError::NotFound { kind: "node", .. }));
}

#[test]
fn batch_create_reports_partial_success() {
    let g = engine();
    let a = node(&g, "a");
    let report = g.store().batch_create_edges(
        &scope(),
        vec![
            GraphEdge::new(&scope(), a, a, "self"),
            GraphEdge::new(&scope(), a, Uuid::new_v4(), "dangling"),
            GraphEdge::new(&scope(), a, a, "bad").with_confidence(2.0),
        ],
    );
    assert_eq!(report.created_count, 1);
    assert_eq!(report.failed_count, 2);
    assert_eq!(report.errors.iter().map(|e| e.index).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(report.created_ids.len(), 1);
}
