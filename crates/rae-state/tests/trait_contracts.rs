//! Trait contract tests for MemoryStore, the three indexes, EmbeddingProvider
//! and SnapshotStore.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes. Any conforming implementation must pass these.

use chrono::{Duration, Utc};
use rae_state::fakes::{HashEmbeddingProvider, InMemoryMemoryBackend, MemorySnapshotStore};
use rae_state::storage_traits::*;
use rae_state::{GraphNode, GraphSnapshot, MemoryItem, MemoryLayer, Scope, StorageError};
use uuid::Uuid;

fn scope() -> Scope {
    Scope::new("tenant-a", "project-1")
}

fn item(content: &str) -> MemoryItem {
    MemoryItem::new(&scope(), MemoryLayer::Episodic, content)
}

// ===========================================================================
// MemoryStore contract tests
// ===========================================================================

#[tokio::test]
async fn memory_insert_get_round_trip() {
    let store = InMemoryMemoryBackend::new();
    let original = item("the build failed on arm64").with_importance(0.7);
    store.insert(original.clone()).await.unwrap();

    let fetched = store.get(&scope(), original.id).await.unwrap();
    assert_eq!(fetched, original);
}

#[tokio::test]
async fn memory_insert_duplicate_id_conflicts() {
    let store = InMemoryMemoryBackend::new();
    let original = item("once");
    store.insert(original.clone()).await.unwrap();

    let err = store.insert(original).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { kind: "memory", .. }));
}

#[tokio::test]
async fn memory_is_invisible_from_other_scope() {
    let store = InMemoryMemoryBackend::new();
    let original = item("private");
    store.insert(original.clone()).await.unwrap();

    let other = Scope::new("tenant-b", "project-1");
    let err = store.get(&other, original.id).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
    assert!(store
        .query(&other, &MemoryFilter::all())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn memory_get_many_skips_missing() {
    let store = InMemoryMemoryBackend::new();
    let a = item("a");
    store.insert(a.clone()).await.unwrap();

    let found = store
        .get_many(&scope(), &[Uuid::new_v4(), a.id])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, a.id);
}

#[tokio::test]
async fn memory_find_by_digest() {
    let store = InMemoryMemoryBackend::new();
    let a = item("exact text");
    store.insert(a.clone()).await.unwrap();

    let hit = store
        .find_by_digest(&scope(), &a.content_digest)
        .await
        .unwrap();
    assert_eq!(hit.map(|i| i.id), Some(a.id));

    let miss = store
        .find_by_digest(&scope(), &ContentDigest::from_bytes(b"other"))
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn memory_query_newest_first_with_limit() {
    let store = InMemoryMemoryBackend::new();
    let now = Utc::now();
    for i in 0..3 {
        store
            .insert(item(&format!("entry {i}")).with_created_at(now + Duration::seconds(i)))
            .await
            .unwrap();
    }

    let found = store
        .query(&scope(), &MemoryFilter::all().with_limit(2))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].content, "entry 2");
    assert_eq!(found[1].content, "entry 1");
}

#[tokio::test]
async fn memory_record_access_increments_usage() {
    let store = InMemoryMemoryBackend::new();
    let a = item("touched");
    store.insert(a.clone()).await.unwrap();

    let at = Utc::now();
    store.record_access(&scope(), a.id, at).await.unwrap();
    let updated = store.record_access(&scope(), a.id, at).await.unwrap();
    assert_eq!(updated.usage_count, 2);
    assert_eq!(updated.last_accessed_at, Some(at));
}

#[tokio::test]
async fn memory_delete_then_get_not_found() {
    let store = InMemoryMemoryBackend::new();
    let a = item("gone");
    store.insert(a.clone()).await.unwrap();
    store.delete(&scope(), a.id).await.unwrap();

    assert!(matches!(
        store.get(&scope(), a.id).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
    assert!(matches!(
        store.delete(&scope(), a.id).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn memory_set_importance_clamps() {
    let store = InMemoryMemoryBackend::new();
    let a = item("x");
    store.insert(a.clone()).await.unwrap();
    store.set_importance(&scope(), a.id, 3.0).await.unwrap();

    assert_eq!(store.get(&scope(), a.id).await.unwrap().importance, 1.0);
}

#[tokio::test]
async fn memory_scopes_lists_populated_partitions() {
    let store = InMemoryMemoryBackend::new();
    store.insert(item("a")).await.unwrap();
    store
        .insert(MemoryItem::new(
            &Scope::new("tenant-b", "p"),
            MemoryLayer::Working,
            "b",
        ))
        .await
        .unwrap();

    let scopes = store.scopes().await.unwrap();
    assert_eq!(scopes.len(), 2);
    assert!(scopes.contains(&scope()));
}

// ===========================================================================
// Index contract tests
// ===========================================================================

#[tokio::test]
async fn vector_search_ranks_by_cosine_and_skips_mismatched_dimensions() {
    let store = InMemoryMemoryBackend::new();
    let close = item("close").with_embedding(vec![1.0, 0.1]);
    let far = item("far").with_embedding(vec![0.2, 1.0]);
    let wrong_dim = item("wrong").with_embedding(vec![1.0, 0.0, 0.0]);
    for i in [&close, &far, &wrong_dim] {
        store.insert(i.clone()).await.unwrap();
    }

    let hits = VectorIndex::search(&store, &scope(), &[1.0, 0.0], 10, &MemoryFilter::all())
        .await
        .unwrap();
    let ids: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![close.id, far.id]);
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn fulltext_search_prefers_matching_terms() {
    let store = InMemoryMemoryBackend::new();
    let paris = item("Paris is the capital of France");
    let berlin = item("Berlin is the capital of Germany");
    let cats = item("Cats sleep most of the day");
    for i in [&paris, &berlin, &cats] {
        store.insert(i.clone()).await.unwrap();
    }

    let hits = FulltextIndex::search(&store, &scope(), "capital of France", 10, &MemoryFilter::all())
        .await
        .unwrap();
    assert_eq!(hits[0].id, paris.id);
    assert!(hits.iter().all(|h| h.id != cats.id));
}

#[tokio::test]
async fn fulltext_search_respects_filter_and_k() {
    let store = InMemoryMemoryBackend::new();
    for i in 0..5 {
        store
            .insert(item(&format!("deploy log {i}")).with_tag(if i % 2 == 0 { "even" } else { "odd" }))
            .await
            .unwrap();
    }

    let hits = FulltextIndex::search(
        &store,
        &scope(),
        "deploy",
        2,
        &MemoryFilter::all().with_tag("even"),
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn semantic_search_uses_tags_and_concepts() {
    let store = InMemoryMemoryBackend::new();
    let tagged = item("a note").with_tag("geography");
    let concept = item("another note")
        .with_metadata("concepts", serde_json::json!(["Geography", "europe"]));
    let unrelated = item("unrelated").with_tag("cooking");
    for i in [&tagged, &concept, &unrelated] {
        store.insert(i.clone()).await.unwrap();
    }

    let hits = SemanticIndex::search(&store, &scope(), "europe geography", 10, &MemoryFilter::all())
        .await
        .unwrap();
    assert_eq!(hits[0].id, concept.id);
    assert_eq!(hits.len(), 2);
}

// ===========================================================================
// EmbeddingProvider contract tests
// ===========================================================================

#[tokio::test]
async fn embedding_has_declared_dimension() {
    let provider = HashEmbeddingProvider::new(32);
    let vector = provider.embed("anything at all").await.unwrap();
    assert_eq!(vector.len(), provider.dimension());
}

// ===========================================================================
// SnapshotStore contract tests
// ===========================================================================

fn snapshot(name: &str, at: chrono::DateTime<Utc>) -> GraphSnapshot {
    let s = scope();
    let node = GraphNode::new(&s, "k", "K");
    GraphSnapshot {
        id: Uuid::new_v4(),
        tenant_id: s.tenant_id.clone(),
        project_id: s.project_id.clone(),
        name: name.to_string(),
        description: None,
        created_at: at,
        node_count: 1,
        edge_count: 0,
        nodes: vec![node],
        edges: Vec::new(),
        tags: Default::default(),
        include_inactive_edges: false,
    }
}

#[tokio::test]
async fn snapshot_put_get_round_trip() {
    let store = MemorySnapshotStore::new();
    let snap = snapshot("s1", Utc::now());
    store.put(snap.clone()).await.unwrap();

    assert_eq!(store.get(&scope(), snap.id).await.unwrap(), snap);
}

#[tokio::test]
async fn snapshot_put_is_append_only() {
    let store = MemorySnapshotStore::new();
    let snap = snapshot("s1", Utc::now());
    store.put(snap.clone()).await.unwrap();

    let err = store.put(snap).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { kind: "snapshot", .. }));
}

#[tokio::test]
async fn snapshot_list_newest_first() {
    let store = MemorySnapshotStore::new();
    let now = Utc::now();
    store.put(snapshot("old", now - Duration::hours(1))).await.unwrap();
    store.put(snapshot("new", now)).await.unwrap();

    let names: Vec<String> = store
        .list(&scope())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["new", "old"]);
}

#[tokio::test]
async fn snapshot_get_unknown_is_not_found() {
    let store = MemorySnapshotStore::new();
    let err = store.get(&scope(), Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { kind: "snapshot", .. }));
}
