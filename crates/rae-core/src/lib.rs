//! RAE Core Library
//!
//! Memory retrieval engine for AI agents: multi-factor scoring, hybrid
//! search across vector, keyword, semantic and graph strategies, a temporal
//! knowledge graph with bounded traversals, and snapshot/restore of graph
//! partitions. Persistence is consumed through the traits in `rae_state`.
//!
//! ## Key Components
//!
//! - `MemoryEngine`: facade over every operation, built by `EngineBuilder`
//! - `scoring`: `ScoreEngine`, importance decay and the decay task
//! - `search`: strategies, intent analysis, weight profiles, fusion
//! - `graph`: `GraphStore`, visibility predicate, `GraphTraversalEngine`
//! - `snapshot`: `SnapshotManager` with replace/merge/preview restores

pub mod config;
pub mod domain;
pub mod engine;
pub mod graph;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod scoring;
pub mod search;
pub mod snapshot;
pub mod telemetry;

pub use config::{
    DecayConfig, DedupConfig, EngineConfig, GraphConfig, ScoringConfig, SearchConfig,
    SnapshotConfig,
};
pub use domain::{RaeError, RaeResult, ValidationError};
pub use engine::{EngineBuilder, MemoryEngine};
pub use graph::{
    CycleOptions, CycleResult, Direction, EdgeFilter, GraphStatistics, GraphStore,
    GraphTraversalEngine, PathCost, PathOptions, PathResult, TraversalAlgorithm,
    TraversalOptions, TraversalResult,
};
pub use memory::{MemoryService, RetentionPolicy, StoreOutcome};
pub use scoring::{
    DecayReport, DecayTask, PeriodicTask, ScoreBreakdown, ScoreCandidate, ScoreEngine,
    ScoreWeights,
};
pub use search::{
    HybridSearchEngine, HybridSearchRequest, HybridSearchResponse, QueryAnalyzer, QueryIntent,
    ScoredMemoryItem, StrategyKind, WeightOverride, WeightProfile, WeightRegistry,
};
pub use snapshot::{RestoreMode, RestoreOptions, RestoreReport, SnapshotManager, SnapshotRequest};

pub use metrics::ENGINE_METRICS;
pub use obs::{
    emit_dedup_hit, emit_search_completed, emit_snapshot_created, emit_snapshot_restored,
    emit_strategy_degraded, query_span,
};
pub use telemetry::init_tracing;

/// RAE version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
