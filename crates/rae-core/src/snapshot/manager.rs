//! Point-in-time snapshots of graph partitions and the three restore
//! modes.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rae_state::{GraphSnapshot, Scope, SnapshotStore};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::diff::SnapshotDiff;
use crate::config::SnapshotConfig;
use crate::domain::validation::{check_not_empty, check_scope};
use crate::domain::{RaeError, RaeResult};
use crate::graph::{GraphPartition, GraphStatistics, GraphStore, MergeOutcome};
use crate::metrics::ENGINE_METRICS;
use crate::obs;

/// Parameters of a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub name: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub include_inactive_edges: bool,
}

impl SnapshotRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn include_inactive_edges(mut self, include: bool) -> Self {
        self.include_inactive_edges = include;
        self
    }
}

/// Snapshot metadata without the captured records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub tags: BTreeSet<String>,
    pub include_inactive_edges: bool,
}

impl From<&GraphSnapshot> for SnapshotSummary {
    fn from(s: &GraphSnapshot) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            description: s.description.clone(),
            created_at: s.created_at,
            node_count: s.node_count,
            edge_count: s.edge_count,
            tags: s.tags.clone(),
            include_inactive_edges: s.include_inactive_edges,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Swap the partition for the snapshot's contents
    Replace,
    /// Add snapshot records that do not exist yet
    Merge,
    /// Report what a replace would change
    Preview,
}

impl RestoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreMode::Replace => "replace",
            RestoreMode::Merge => "merge",
            RestoreMode::Preview => "preview",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub mode: RestoreMode,
    /// Pre-restore backup for replace mode; `None` follows configuration
    pub backup: Option<bool>,
}

impl RestoreOptions {
    pub fn new(mode: RestoreMode) -> Self {
        Self { mode, backup: None }
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = Some(backup);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub snapshot_id: Uuid,
    pub mode: RestoreMode,
    pub backup_snapshot_id: Option<Uuid>,
    /// Partition size after the restore (unchanged for preview)
    pub node_count: usize,
    pub edge_count: usize,
    pub diff: Option<SnapshotDiff>,
    pub merge: Option<MergeOutcome>,
}

/// Creates, lists and restores snapshots of [`GraphStore`] partitions.
pub struct SnapshotManager {
    graph: Arc<GraphStore>,
    store: Arc<dyn SnapshotStore>,
    config: SnapshotConfig,
}

impl SnapshotManager {
    pub fn new(graph: Arc<GraphStore>, store: Arc<dyn SnapshotStore>, config: SnapshotConfig) -> Self {
        Self {
            graph,
            store,
            config,
        }
    }

    fn build(
        scope: &Scope,
        request: SnapshotRequest,
        nodes: Vec<rae_state::GraphNode>,
        edges: Vec<rae_state::GraphEdge>,
    ) -> GraphSnapshot {
        GraphSnapshot {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            name: request.name,
            description: request.description,
            created_at: Utc::now(),
            node_count: nodes.len(),
            edge_count: edges.len(),
            nodes,
            edges,
            tags: request.tags,
            include_inactive_edges: request.include_inactive_edges,
        }
    }

    /// Capture the partition under one read lock and persist it.
    #[instrument(skip_all, fields(scope = %scope, name = %request.name))]
    pub async fn create(&self, scope: &Scope, request: SnapshotRequest) -> RaeResult<GraphSnapshot> {
        check_scope(scope)?;
        check_not_empty("name", &request.name)?;
        let (nodes, edges) = self.graph.capture(scope, request.include_inactive_edges);
        let snapshot = Self::build(scope, request, nodes, edges);
        self.store.put(snapshot.clone()).await?;
        ENGINE_METRICS.inc_snapshots_created();
        obs::emit_snapshot_created(scope, snapshot.id, snapshot.node_count, snapshot.edge_count);
        Ok(snapshot)
    }

    /// Newest first.
    pub async fn list(&self, scope: &Scope) -> RaeResult<Vec<SnapshotSummary>> {
        let snapshots = self.store.list(scope).await?;
        Ok(snapshots.iter().map(SnapshotSummary::from).collect())
    }

    pub async fn get(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphSnapshot> {
        Ok(self.store.get(scope, id).await?)
    }

    /// Fill the snapshot fields of partition statistics.
    pub async fn annotate(&self, scope: &Scope, mut stats: GraphStatistics) -> RaeResult<GraphStatistics> {
        let snapshots = self.store.list(scope).await?;
        stats.snapshot_count = snapshots.len();
        stats.latest_snapshot = snapshots.iter().map(|s| s.created_at).max();
        Ok(stats)
    }

    pub async fn restore(&self, scope: &Scope, id: Uuid, mode: RestoreMode) -> RaeResult<RestoreReport> {
        self.restore_with(scope, id, RestoreOptions::new(mode)).await
    }

    #[instrument(skip_all, fields(scope = %scope, snapshot_id = %id, mode = options.mode.as_str()))]
    pub async fn restore_with(
        &self,
        scope: &Scope,
        id: Uuid,
        options: RestoreOptions,
    ) -> RaeResult<RestoreReport> {
        let snapshot = self.store.get(scope, id).await?;
        let report = match options.mode {
            RestoreMode::Preview => self.preview(scope, &snapshot),
            RestoreMode::Merge => self.merge(scope, snapshot),
            RestoreMode::Replace => {
                let backup = options.backup.unwrap_or(self.config.auto_backup);
                self.replace(scope, snapshot, backup).await?
            }
        };
        if options.mode != RestoreMode::Preview {
            ENGINE_METRICS.inc_restores();
            obs::emit_snapshot_restored(scope, id, options.mode.as_str());
        }
        Ok(report)
    }

    fn preview(&self, scope: &Scope, snapshot: &GraphSnapshot) -> RestoreReport {
        let (nodes, edges) = self.graph.capture(scope, true);
        let diff = SnapshotDiff::compute(&nodes, &edges, &snapshot.nodes, &snapshot.edges);
        RestoreReport {
            snapshot_id: snapshot.id,
            mode: RestoreMode::Preview,
            backup_snapshot_id: None,
            node_count: nodes.len(),
            edge_count: edges.len(),
            diff: Some(diff),
            merge: None,
        }
    }

    fn merge(&self, scope: &Scope, snapshot: GraphSnapshot) -> RestoreReport {
        let id = snapshot.id;
        let outcome = self.graph.merge(scope, snapshot.nodes, snapshot.edges);
        let (node_count, edge_count) = self.graph.read(scope, |p| (p.node_count(), p.edge_count()));
        RestoreReport {
            snapshot_id: id,
            mode: RestoreMode::Merge,
            backup_snapshot_id: None,
            node_count,
            edge_count,
            diff: None,
            merge: Some(outcome),
        }
    }

    /// Replace the partition with the snapshot's contents.
    ///
    /// The backup is persisted before anything changes. The swap then only
    /// happens if no write reached the partition while the backup was in
    /// flight, so the backup always matches the state being replaced.
    async fn replace(&self, scope: &Scope, snapshot: GraphSnapshot, backup: bool) -> RaeResult<RestoreReport> {
        let snapshot_id = snapshot.id;
        let next = GraphPartition::from_parts(snapshot.nodes, snapshot.edges).map_err(|e| {
            RaeError::Transaction(format!("snapshot {snapshot_id} is not restorable: {e}"))
        })?;
        let (node_count, edge_count) = (next.node_count(), next.edge_count());

        let backup_snapshot_id = if backup {
            Some(self.backup_then_swap(scope, snapshot_id, next).await?)
        } else {
            self.graph.replace_partition(scope, next);
            None
        };

        Ok(RestoreReport {
            snapshot_id,
            mode: RestoreMode::Replace,
            backup_snapshot_id,
            node_count,
            edge_count,
            diff: None,
            merge: None,
        })
    }

    /// Persist a backup of the current partition, then swap in `next` if
    /// nothing was written in the meantime. Returns the backup's id.
    async fn backup_then_swap(&self, scope: &Scope, snapshot_id: Uuid, next: GraphPartition) -> RaeResult<Uuid> {
        let (generation, old_nodes, old_edges) = self.graph.capture_versioned(scope);
        let request = SnapshotRequest::new(format!("pre-restore-{snapshot_id}"))
            .with_description(format!("automatic backup before restoring {snapshot_id}"))
            .with_tag("auto-backup")
            .include_inactive_edges(true);
        let backup = Self::build(scope, request, old_nodes, old_edges);
        let backup_id = backup.id;
        if let Err(err) = self.store.put(backup).await {
            ENGINE_METRICS.inc_rollbacks();
            obs::emit_restore_rolled_back(scope, snapshot_id, &err);
            return Err(RaeError::Transaction(format!(
                "persisting pre-restore backup failed, graph left unchanged: {err}"
            )));
        }

        if self.graph.replace_partition_if(scope, generation, next).is_err() {
            let err = format!("graph changed while backup {backup_id} was being written");
            ENGINE_METRICS.inc_rollbacks();
            obs::emit_restore_rolled_back(scope, snapshot_id, &err);
            return Err(RaeError::Transaction(format!("restore of {snapshot_id} abandoned: {err}")));
        }
        Ok(backup_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rae_state::fakes::MemorySnapshotStore;
    use rae_state::{GraphEdge, GraphNode, StorageError, StorageResult};

    fn scope() -> Scope {
        Scope::new("t", "p")
    }

    fn manager() -> (SnapshotManager, Arc<GraphStore>) {
        let graph = Arc::new(GraphStore::new());
        let manager = SnapshotManager::new(
            graph.clone(),
            Arc::new(MemorySnapshotStore::new()),
            SnapshotConfig::default(),
        );
        (manager, graph)
    }

    #[tokio::test]
    async fn test_inactive_edges_excluded_unless_requested() {
        let (manager, graph) = manager();
        let a = graph.create_node(&scope(), GraphNode::new(&scope(), "a", "A")).unwrap();
        let b = graph.create_node(&scope(), GraphNode::new(&scope(), "b", "B")).unwrap();
        let e = graph
            .create_edge(&scope(), GraphEdge::new(&scope(), a.id, b.id, "rel"))
            .unwrap();
        graph.deactivate_edge(&scope(), e.id).unwrap();

        let without = manager.create(&scope(), SnapshotRequest::new("s1")).await.unwrap();
        assert_eq!(without.edge_count, 0);
        let with = manager
            .create(&scope(), SnapshotRequest::new("s2").include_inactive_edges(true))
            .await
            .unwrap();
        assert_eq!(with.edge_count, 1);

        let listed = manager.list(&scope()).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (manager, _) = manager();
        let err = manager.create(&scope(), SnapshotRequest::new(" ")).await.unwrap_err();
        assert!(matches!(err, RaeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let (manager, graph) = manager();
        graph.create_node(&scope(), GraphNode::new(&scope(), "a", "A")).unwrap();
        let snap = manager.create(&scope(), SnapshotRequest::new("s")).await.unwrap();
        graph.create_node(&scope(), GraphNode::new(&scope(), "b", "B")).unwrap();

        let report = manager.restore(&scope(), snap.id, RestoreMode::Preview).await.unwrap();
        let diff = report.diff.unwrap();
        assert_eq!(diff.nodes_removed.len(), 1);
        assert_eq!(graph.list_nodes(&scope()).len(), 2);
    }

    /// While a pre-restore backup is being written, records what a reader
    /// sees and creates node "late" through the graph, then fails the write
    /// if `fail_backup` is set.
    struct WritesDuringBackup {
        inner: MemorySnapshotStore,
        graph: Arc<GraphStore>,
        fail_backup: bool,
        seen_keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SnapshotStore for WritesDuringBackup {
        async fn put(&self, snapshot: GraphSnapshot) -> StorageResult<()> {
            if snapshot.name.starts_with("pre-restore") {
                let mut keys: Vec<String> = self
                    .graph
                    .list_nodes(&scope())
                    .into_iter()
                    .map(|n| n.external_key)
                    .collect();
                keys.sort();
                *self.seen_keys.lock() = keys;
                self.graph
                    .create_node(&scope(), GraphNode::new(&scope(), "late", "Late"))
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                if self.fail_backup {
                    return Err(StorageError::Backend("disk full".to_string()));
                }
            }
            self.inner.put(snapshot).await
        }

        async fn get(&self, scope: &Scope, id: Uuid) -> StorageResult<GraphSnapshot> {
            self.inner.get(scope, id).await
        }

        async fn list(&self, scope: &Scope) -> StorageResult<Vec<GraphSnapshot>> {
            self.inner.list(scope).await
        }
    }

    /// Graph holds "a" and "b"; the returned snapshot holds only "a".
    async fn racing_manager(
        fail_backup: bool,
    ) -> (SnapshotManager, Arc<GraphStore>, Arc<WritesDuringBackup>, Uuid) {
        let graph = Arc::new(GraphStore::new());
        let store = Arc::new(WritesDuringBackup {
            inner: MemorySnapshotStore::new(),
            graph: graph.clone(),
            fail_backup,
            seen_keys: Mutex::new(Vec::new()),
        });
        let manager = SnapshotManager::new(graph.clone(), store.clone(), SnapshotConfig::default());
        graph.create_node(&scope(), GraphNode::new(&scope(), "a", "A")).unwrap();
        let snap = manager.create(&scope(), SnapshotRequest::new("only-a")).await.unwrap();
        graph.create_node(&scope(), GraphNode::new(&scope(), "b", "B")).unwrap();
        (manager, graph, store, snap.id)
    }

    fn keys(graph: &GraphStore) -> Vec<String> {
        let mut keys: Vec<String> = graph
            .list_nodes(&scope())
            .into_iter()
            .map(|n| n.external_key)
            .collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_failed_backup_keeps_writes_made_during_it() {
        let (manager, graph, store, snap_id) = racing_manager(true).await;

        let err = manager
            .restore(&scope(), snap_id, RestoreMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, RaeError::Transaction(_)), "{err}");
        assert_eq!(*store.seen_keys.lock(), vec!["a", "b"]);
        assert_eq!(keys(&graph), vec!["a", "b", "late"]);
    }

    #[tokio::test]
    async fn test_write_during_backup_abandons_the_swap() {
        let (manager, graph, store, snap_id) = racing_manager(false).await;

        let err = manager
            .restore(&scope(), snap_id, RestoreMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, RaeError::Transaction(_)), "{err}");
        assert_eq!(*store.seen_keys.lock(), vec!["a", "b"]);
        assert_eq!(keys(&graph), vec!["a", "b", "late"]);

        // once nothing races it the restore goes through
        let options = RestoreOptions::new(RestoreMode::Replace).with_backup(false);
        let report = manager
            .restore_with(&scope(), snap_id, options)
            .await
            .unwrap();
        assert_eq!(report.node_count, 1);
        assert_eq!(keys(&graph), vec!["a"]);
    }

    #[tokio::test]
    async fn test_unknown_snapshot_not_found() {
        let (manager, _) = manager();
        let err = manager
            .restore(&scope(), Uuid::new_v4(), RestoreMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, RaeError::NotFound { kind: "snapshot", .. }));
    }
}
