//! In-memory fakes for storage traits
//!
//! Provides `InMemoryMemoryBackend` (store plus all three indexes),
//! `HashEmbeddingProvider` and `MemorySnapshotStore`. They satisfy the
//! trait contracts without any external dependencies and back both the
//! test suites and the single-process daemon.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::{GraphSnapshot, MemoryItem, Scope};
use crate::storage_traits::*;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "how", "in", "is",
    "it", "of", "on", "or", "that", "the", "to", "was", "what", "when", "where", "which", "who",
    "why", "with",
];

/// Lowercase alphanumeric tokens with stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

fn top_k(mut hits: Vec<IndexHit>, k: usize) -> Vec<IndexHit> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(k);
    hits
}

// ---------------------------------------------------------------------------
// InMemoryMemoryBackend
// ---------------------------------------------------------------------------

/// In-memory memory store backed by a `HashMap<Scope, BTreeMap<id, item>>`.
///
/// Also serves as the vector index (cosine similarity), the fulltext index
/// (BM25 over content tokens) and the semantic index (overlap between query
/// terms and item tags plus the `concepts` metadata array).
#[derive(Debug, Default)]
pub struct InMemoryMemoryBackend {
    items: RwLock<HashMap<Scope, BTreeMap<Uuid, MemoryItem>>>,
}

impl InMemoryMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn candidates(&self, scope: &Scope, filter: &MemoryFilter) -> Vec<MemoryItem> {
        let items = self.items.read();
        items
            .get(scope)
            .map(|partition| {
                partition
                    .values()
                    .filter(|item| filter.matches(item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn concepts(item: &MemoryItem) -> HashSet<String> {
        let mut concepts: HashSet<String> = item.tags.iter().map(|t| t.to_lowercase()).collect();
        if let Some(serde_json::Value::Array(values)) = item.metadata.get("concepts") {
            concepts.extend(
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_lowercase),
            );
        }
        concepts
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryBackend {
    async fn insert(&self, item: MemoryItem) -> StorageResult<()> {
        let mut items = self.items.write();
        let partition = items.entry(item.scope()).or_default();
        if partition.contains_key(&item.id) {
            return Err(StorageError::Conflict {
                kind: "memory",
                id: item.id.to_string(),
            });
        }
        partition.insert(item.id, item);
        Ok(())
    }

    async fn get(&self, scope: &Scope, id: Uuid) -> StorageResult<MemoryItem> {
        let items = self.items.read();
        items
            .get(scope)
            .and_then(|p| p.get(&id))
            .cloned()
            .ok_or_else(|| StorageError::not_found("memory", id))
    }

    async fn get_many(&self, scope: &Scope, ids: &[Uuid]) -> StorageResult<Vec<MemoryItem>> {
        let items = self.items.read();
        let Some(partition) = items.get(scope) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| partition.get(id))
            .cloned()
            .collect())
    }

    async fn find_by_digest(
        &self,
        scope: &Scope,
        digest: &ContentDigest,
    ) -> StorageResult<Option<MemoryItem>> {
        let items = self.items.read();
        Ok(items.get(scope).and_then(|p| {
            p.values()
                .filter(|item| &item.content_digest == digest)
                .min_by_key(|item| item.created_at)
                .cloned()
        }))
    }

    async fn query(&self, scope: &Scope, filter: &MemoryFilter) -> StorageResult<Vec<MemoryItem>> {
        let mut found = self.candidates(scope, filter);
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn delete(&self, scope: &Scope, id: Uuid) -> StorageResult<()> {
        let mut items = self.items.write();
        items
            .get_mut(scope)
            .and_then(|p| p.remove(&id))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("memory", id))
    }

    async fn record_access(
        &self,
        scope: &Scope,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<MemoryItem> {
        let mut items = self.items.write();
        let item = items
            .get_mut(scope)
            .and_then(|p| p.get_mut(&id))
            .ok_or_else(|| StorageError::not_found("memory", id))?;
        item.touch(at);
        Ok(item.clone())
    }

    async fn set_importance(&self, scope: &Scope, id: Uuid, importance: f64) -> StorageResult<()> {
        let mut items = self.items.write();
        let item = items
            .get_mut(scope)
            .and_then(|p| p.get_mut(&id))
            .ok_or_else(|| StorageError::not_found("memory", id))?;
        item.importance = importance.clamp(0.0, 1.0);
        Ok(())
    }

    async fn scopes(&self) -> StorageResult<Vec<Scope>> {
        let items = self.items.read();
        let mut scopes: Vec<Scope> = items
            .iter()
            .filter(|(_, p)| !p.is_empty())
            .map(|(scope, _)| scope.clone())
            .collect();
        scopes.sort();
        Ok(scopes)
    }
}

#[async_trait]
impl VectorIndex for InMemoryMemoryBackend {
    async fn search(
        &self,
        scope: &Scope,
        embedding: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> StorageResult<Vec<IndexHit>> {
        let hits = self
            .candidates(scope, filter)
            .iter()
            .filter_map(|item| {
                let stored = item.embedding.as_deref()?;
                let score = cosine(embedding, stored)?;
                (score > 0.0).then(|| IndexHit::new(item.id, score))
            })
            .collect();
        Ok(top_k(hits, k))
    }
}

#[async_trait]
impl FulltextIndex for InMemoryMemoryBackend {
    async fn search(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> StorageResult<Vec<IndexHit>> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<(Uuid, Vec<String>)> = self
            .candidates(scope, filter)
            .into_iter()
            .map(|item| (item.id, tokenize(&item.content)))
            .collect();
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        const K1: f64 = 1.2;
        const B: f64 = 0.75;
        let n = docs.len() as f64;
        let avg_len = docs.iter().map(|(_, t)| t.len()).sum::<usize>() as f64 / n;

        let hits = docs
            .iter()
            .filter_map(|(id, tokens)| {
                let len = tokens.len() as f64;
                let mut score = 0.0;
                for term in &terms {
                    let tf = tokens.iter().filter(|t| *t == term).count() as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = docs.iter().filter(|(_, d)| d.contains(term)).count() as f64;
                    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                    let norm = 1.0 - B + B * len / avg_len.max(1.0);
                    score += idf * tf * (K1 + 1.0) / (tf + K1 * norm);
                }
                (score > 0.0).then(|| IndexHit::new(*id, score))
            })
            .collect();
        Ok(top_k(hits, k))
    }
}

#[async_trait]
impl SemanticIndex for InMemoryMemoryBackend {
    async fn search(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> StorageResult<Vec<IndexHit>> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .candidates(scope, filter)
            .iter()
            .filter_map(|item| {
                let concepts = Self::concepts(item);
                let overlap = terms.iter().filter(|t| concepts.contains(*t)).count();
                (overlap > 0).then(|| IndexHit::new(item.id, overlap as f64 / terms.len() as f64))
            })
            .collect();
        Ok(top_k(hits, k))
    }
}

// ---------------------------------------------------------------------------
// HashEmbeddingProvider
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedding.
///
/// Each token is hashed into one of `dimension` signed buckets and the
/// result is L2-normalized. Texts sharing most tokens land close together.
/// Fixed vectors can be pinned per text for tests that need an exact
/// similarity.
#[derive(Debug)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    fixed: RwLock<HashMap<String, Vec<f32>>>,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            fixed: RwLock::new(HashMap::new()),
        }
    }

    /// Always answer `vector` for exactly `text`.
    pub fn with_fixed(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.fixed.write().insert(text.into(), vector);
        self
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> StorageResult<Vec<f32>> {
        if let Some(vector) = self.fixed.read().get(text) {
            return Ok(vector.clone());
        }
        Ok(self.hash_embed(text))
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory snapshot history backed by a `HashMap<Scope, Vec<GraphSnapshot>>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<Scope, Vec<GraphSnapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, snapshot: GraphSnapshot) -> StorageResult<()> {
        let mut snapshots = self.snapshots.write();
        let history = snapshots.entry(snapshot.scope()).or_default();
        if history.iter().any(|s| s.id == snapshot.id) {
            return Err(StorageError::Conflict {
                kind: "snapshot",
                id: snapshot.id.to_string(),
            });
        }
        history.push(snapshot);
        Ok(())
    }

    async fn get(&self, scope: &Scope, id: Uuid) -> StorageResult<GraphSnapshot> {
        let snapshots = self.snapshots.read();
        snapshots
            .get(scope)
            .and_then(|history| history.iter().find(|s| s.id == id))
            .cloned()
            .ok_or_else(|| StorageError::not_found("snapshot", id))
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<GraphSnapshot>> {
        let snapshots = self.snapshots.read();
        let mut history = snapshots.get(scope).cloned().unwrap_or_default();
        // stable on insertion order so equal timestamps list newest-inserted first
        history.reverse();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(
            tokenize("Paris is the capital of France!"),
            vec!["paris", "capital", "france"]
        );
    }

    #[test]
    fn cosine_rejects_mismatched_lengths() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), None);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), None);
        let same = cosine(&[0.3, 0.4], &[0.3, 0.4]).unwrap();
        assert!((same - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn hash_embedding_is_deterministic_and_normalized() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed("capital of France").await.unwrap();
        let b = provider.embed("capital of France").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn fixed_embedding_overrides_hash() {
        let provider = HashEmbeddingProvider::new(3).with_fixed("pinned", vec![1.0, 0.0, 0.0]);
        assert_eq!(provider.embed("pinned").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }
}
