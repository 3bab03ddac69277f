//! Store, fetch and access-tracking for memory items.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rae_state::{
    ContentDigest, EmbeddingProvider, MemoryFilter, MemoryItem, MemoryStore, Scope, VectorIndex,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::domain::validation::{check_not_empty, check_scope};
use crate::domain::{RaeError, RaeResult, ValidationError};
use crate::metrics::ENGINE_METRICS;
use crate::obs;

/// Result of [`MemoryService::store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreOutcome {
    /// Id of the stored item, or of the existing item it duplicates
    pub id: Uuid,
    pub deduplicated: bool,
    /// Similarity to the existing item when deduplicated
    pub similarity: Option<f64>,
}

impl StoreOutcome {
    fn created(id: Uuid) -> Self {
        Self {
            id,
            deduplicated: false,
            similarity: None,
        }
    }

    fn duplicate(id: Uuid, similarity: f64) -> Self {
        Self {
            id,
            deduplicated: true,
            similarity: Some(similarity),
        }
    }
}

/// Memory item lifecycle over a [`MemoryStore`] and its vector index.
pub struct MemoryService {
    store: Arc<dyn MemoryStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    dedup: DedupConfig,
    embedding_timeout: Duration,
}

impl MemoryService {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        vectors: Arc<dyn VectorIndex>,
        dedup: DedupConfig,
        embedding_timeout: Duration,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder: None,
            dedup,
            embedding_timeout,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn store_handle(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn embedder(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.embedder.as_ref()
    }

    /// Embed `text` under the configured timeout.
    pub async fn embed(&self, text: &str) -> RaeResult<Option<Vec<f32>>> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        match tokio::time::timeout(self.embedding_timeout, embedder.embed(text)).await {
            Ok(result) => Ok(Some(result?)),
            Err(_) => Err(RaeError::Timeout {
                operation: "embed".to_string(),
                millis: self.embedding_timeout.as_millis() as u64,
            }),
        }
    }

    /// Validate, embed and insert `item`.
    ///
    /// With deduplication enabled, an item whose content digest matches an
    /// existing item, or whose embedding is at least the configured
    /// similarity to one, is not inserted; the existing id is returned.
    #[instrument(skip_all, fields(tenant = %item.tenant_id, project = %item.project_id))]
    pub async fn store(&self, mut item: MemoryItem) -> RaeResult<StoreOutcome> {
        let scope = item.scope();
        check_scope(&scope)?;
        check_not_empty("content", &item.content)?;
        item.importance = if item.importance.is_nan() {
            0.0
        } else {
            item.importance.clamp(0.0, 1.0)
        };
        item.content_digest = ContentDigest::from_bytes(item.content.as_bytes());

        if self.dedup.enabled {
            if let Some(existing) = self.store.find_by_digest(&scope, &item.content_digest).await? {
                return Ok(self.duplicate(&scope, existing.id, 1.0));
            }
        }

        if item.embedding.is_none() {
            item.embedding = self.embed(&item.content).await?;
        }
        if let (Some(embedding), Some(embedder)) = (&item.embedding, &self.embedder) {
            let dimension = embedder.dimension();
            if embedding.len() != dimension {
                return Err(ValidationError::OutOfRange {
                    field: "embedding dimension",
                    value: embedding.len() as f64,
                    min: dimension as f64,
                    max: dimension as f64,
                }
                .into());
            }
        }

        if self.dedup.enabled {
            if let Some(embedding) = &item.embedding {
                let nearest = self
                    .vectors
                    .search(&scope, embedding, 1, &MemoryFilter::all())
                    .await?;
                if let Some(hit) = nearest.first() {
                    if hit.score >= self.dedup.similarity_threshold {
                        return Ok(self.duplicate(&scope, hit.id, hit.score));
                    }
                }
            }
        }

        let id = item.id;
        self.store.insert(item).await?;
        ENGINE_METRICS.inc_memories_stored();
        debug!(event = "memory.stored", scope = %scope, id = %id);
        Ok(StoreOutcome::created(id))
    }

    fn duplicate(&self, scope: &Scope, existing: Uuid, similarity: f64) -> StoreOutcome {
        ENGINE_METRICS.inc_dedup_hits();
        obs::emit_dedup_hit(scope, existing, similarity);
        StoreOutcome::duplicate(existing, similarity)
    }

    pub async fn get(&self, scope: &Scope, id: Uuid) -> RaeResult<MemoryItem> {
        Ok(self.store.get(scope, id).await?)
    }

    pub async fn query(&self, scope: &Scope, filter: &MemoryFilter) -> RaeResult<Vec<MemoryItem>> {
        Ok(self.store.query(scope, filter).await?)
    }

    pub async fn delete(&self, scope: &Scope, id: Uuid) -> RaeResult<()> {
        self.store.delete(scope, id).await?;
        debug!(event = "memory.deleted", scope = %scope, id = %id);
        Ok(())
    }

    /// Bump `usage_count` and `last_accessed_at`.
    pub async fn record_access(&self, scope: &Scope, id: Uuid) -> RaeResult<MemoryItem> {
        Ok(self.store.record_access(scope, id, Utc::now()).await?)
    }
}
