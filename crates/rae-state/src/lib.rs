//! RAE-State: persistence layer for the RAE memory engine
//!
//! This crate defines the logical schema of memory items and the temporal
//! knowledge graph, plus the capability traits the engine consumes. Concrete
//! backends (relational store, vector index, fulltext index) live outside
//! the engine and plug in through these traits.
//!
//! ## Key Components
//!
//! - `MemoryItem`, `GraphNode`, `GraphEdge`, `GraphSnapshot`: schema records
//! - `MemoryStore`, `VectorIndex`, `FulltextIndex`, `SemanticIndex`,
//!   `EmbeddingProvider`, `SnapshotStore`, `Reranker`: capability traits
//! - `fakes`: in-memory implementations of every trait

mod error;
pub mod fakes;
mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use schema::{
    GraphEdge, GraphNode, GraphSnapshot, MemoryItem, MemoryLayer, Scope, DEFAULT_EDGE_CONFIDENCE,
    DEFAULT_EDGE_WEIGHT, DEFAULT_IMPORTANCE,
};
pub use storage_traits::{
    ContentDigest, EmbeddingProvider, FulltextIndex, IndexHit, MemoryFilter, MemoryStore,
    Reranker, SemanticIndex, SnapshotStore, StorageResult, VectorIndex,
};
