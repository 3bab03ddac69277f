//! Storage trait definitions for RAE
//!
//! These traits are the capability interfaces the engine consumes:
//! - `MemoryStore`: CRUD and filtered queries over memory items
//! - `VectorIndex`, `FulltextIndex`, `SemanticIndex`: top-k candidate search
//! - `EmbeddingProvider`: text to fixed-dimension vector
//! - `SnapshotStore`: append-only graph snapshot history
//! - `Reranker`: optional second-pass scorer
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::{GraphSnapshot, MemoryItem, MemoryLayer, Scope};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Filter applied to memory queries and index searches.
///
/// Empty filter matches everything. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub layer: Option<MemoryLayer>,
    /// Every listed tag must be present on the item
    pub tags: BTreeSet<String>,
    pub min_importance: Option<f64>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: MemoryLayer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the non-limit conditions against one item.
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(layer) = self.layer {
            if item.layer != layer {
                return false;
            }
        }
        if !self.tags.iter().all(|tag| item.tags.contains(tag)) {
            return false;
        }
        if let Some(min) = self.min_importance {
            if item.importance < min {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if item.created_at <= after {
                return false;
            }
        }
        true
    }
}

/// Persistence for memory items.
///
/// Guarantees:
/// - Items are only visible through the scope they were inserted under.
/// - `insert` rejects an id that already exists with `StorageError::Conflict`.
/// - `record_access` increments `usage_count` and sets `last_accessed_at`.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn insert(&self, item: MemoryItem) -> StorageResult<()>;

    /// Returns `StorageError::NotFound` if absent.
    async fn get(&self, scope: &Scope, id: Uuid) -> StorageResult<MemoryItem>;

    /// Fetch several items; missing ids are skipped.
    async fn get_many(&self, scope: &Scope, ids: &[Uuid]) -> StorageResult<Vec<MemoryItem>>;

    /// Item with exactly this content digest, if any.
    async fn find_by_digest(
        &self,
        scope: &Scope,
        digest: &ContentDigest,
    ) -> StorageResult<Option<MemoryItem>>;

    /// Items matching `filter`, newest first.
    async fn query(&self, scope: &Scope, filter: &MemoryFilter) -> StorageResult<Vec<MemoryItem>>;

    /// Returns `StorageError::NotFound` if absent.
    async fn delete(&self, scope: &Scope, id: Uuid) -> StorageResult<()>;

    /// Record one access and return the updated item.
    async fn record_access(
        &self,
        scope: &Scope,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<MemoryItem>;

    async fn set_importance(&self, scope: &Scope, id: Uuid, importance: f64) -> StorageResult<()>;

    /// Every scope holding at least one item.
    async fn scopes(&self) -> StorageResult<Vec<Scope>>;
}

// ---------------------------------------------------------------------------
// Indexes
// ---------------------------------------------------------------------------

/// One candidate returned by an index, with the backend's raw score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub id: Uuid,
    pub score: f64,
}

impl IndexHit {
    pub fn new(id: Uuid, score: f64) -> Self {
        Self { id, score }
    }
}

/// Top-k nearest neighbours by embedding similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Hits sorted by score descending. Higher is more similar.
    async fn search(
        &self,
        scope: &Scope,
        embedding: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> StorageResult<Vec<IndexHit>>;
}

/// Top-k lexical matches.
#[async_trait]
pub trait FulltextIndex: Send + Sync {
    async fn search(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> StorageResult<Vec<IndexHit>>;
}

/// Top-k concept matches.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn search(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> StorageResult<Vec<IndexHit>>;
}

/// Text to fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> StorageResult<Vec<f32>>;
}

/// Second-pass relevance scorer over `(id, content)` pairs.
///
/// Must return one score per candidate, in input order.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[(Uuid, String)]) -> StorageResult<Vec<f64>>;
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Append-only history of graph snapshots.
///
/// Guarantees:
/// - `put` never overwrites: an existing id is `StorageError::Conflict`.
/// - `list` is newest first.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, snapshot: GraphSnapshot) -> StorageResult<()>;

    /// Returns `StorageError::NotFound` if absent.
    async fn get(&self, scope: &Scope, id: Uuid) -> StorageResult<GraphSnapshot>;

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<GraphSnapshot>>;
}
