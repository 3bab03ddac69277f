//! Temporal knowledge graph.
//!
//! - `store`: tenant-scoped node/edge storage, batch operations, statistics
//! - `visibility`: the single edge-visibility predicate and traversal filters
//! - `traversal`: BFS/DFS, shortest path and cycle detection

pub mod store;
pub mod traversal;
pub mod visibility;

pub use store::{
    BatchItemError, BatchReport, DuplicateKeyPolicy, EdgeUpdate, GraphPartition, GraphStatistics,
    GraphStore, MergeOutcome, NodeDegreeMetrics, NodeUpdate,
};
pub use traversal::{
    CycleOptions, CycleResult, GraphTraversalEngine, PathCost, PathOptions, PathResult,
    TraversalAlgorithm, TraversalOptions, TraversalResult, TraversalStep,
};
pub use visibility::{is_edge_visible, Direction, EdgeFilter};
