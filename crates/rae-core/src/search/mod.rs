//! Hybrid retrieval.
//!
//! - `strategy`: vector, keyword, semantic and graph strategies behind one trait
//! - `intent`: pattern-scored query intent
//! - `weights`: named weight profiles and their selection
//! - `fusion`: normalization, weighted fusion, ranking and reranking
//! - `hybrid`: the concurrent search pipeline

pub mod fusion;
pub mod hybrid;
pub mod intent;
pub mod strategy;
pub mod weights;

pub use fusion::{min_max_normalize, FusedCandidate, ScoredMemoryItem, StrategyScore};
pub use hybrid::{
    HybridSearchEngine, HybridSearchRequest, HybridSearchResponse, StrategyReport, StrategyStatus,
};
pub use intent::{IntentCategory, QueryAnalyzer, QueryIntent};
pub use strategy::{
    GraphSeeds, GraphStrategy, KeywordStrategy, SearchStrategyExecutor, SemanticStrategy,
    StrategyHit, StrategyKind, StrategyQuery, VectorStrategy,
};
pub use weights::{
    builtin_profiles, select_weights, WeightOverride, WeightProfile, WeightRegistry, WeightSource,
};
