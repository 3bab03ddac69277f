//! `MemoryEngine`: one handle over memory, search, graph and snapshots.
//!
//! The engine owns no global state. Every operation takes an explicit
//! [`Scope`], and every collaborator is injected through [`EngineBuilder`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rae_state::fakes::{HashEmbeddingProvider, InMemoryMemoryBackend, MemorySnapshotStore};
use rae_state::{
    EmbeddingProvider, FulltextIndex, GraphEdge, GraphNode, GraphSnapshot, MemoryFilter,
    MemoryItem, MemoryStore, Reranker, Scope, SemanticIndex, SnapshotStore, VectorIndex,
};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::RaeResult;
use crate::graph::{
    BatchReport, CycleOptions, CycleResult, EdgeUpdate, GraphStatistics, GraphStore,
    GraphTraversalEngine, NodeDegreeMetrics, NodeUpdate, PathOptions, PathResult,
    TraversalAlgorithm, TraversalOptions, TraversalResult,
};
use crate::memory::{apply_retention, MemoryService, RetentionPolicy, RetentionReport, StoreOutcome};
use crate::scoring::{DecayTask, ScoreBreakdown, ScoreCandidate, ScoreEngine};
use crate::search::{
    GraphStrategy, HybridSearchEngine, HybridSearchRequest, HybridSearchResponse,
    KeywordStrategy, SemanticStrategy, VectorStrategy, WeightProfile, WeightRegistry,
};
use crate::snapshot::{RestoreOptions, RestoreReport, SnapshotManager, SnapshotRequest, SnapshotSummary};

/// Collaborators of a [`MemoryEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    memories: Arc<dyn MemoryStore>,
    vectors: Arc<dyn VectorIndex>,
    fulltext: Arc<dyn FulltextIndex>,
    semantic: Arc<dyn SemanticIndex>,
    snapshots: Arc<dyn SnapshotStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
    graph: Option<Arc<GraphStore>>,
}

impl EngineBuilder {
    pub fn new(
        config: EngineConfig,
        memories: Arc<dyn MemoryStore>,
        vectors: Arc<dyn VectorIndex>,
        fulltext: Arc<dyn FulltextIndex>,
        semantic: Arc<dyn SemanticIndex>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            memories,
            vectors,
            fulltext,
            semantic,
            snapshots,
            embedder: None,
            reranker: None,
            graph: None,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Share an existing graph store instead of starting empty.
    pub fn graph(mut self, graph: Arc<GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn build(self) -> RaeResult<MemoryEngine> {
        self.config.validate()?;
        let config = self.config;
        let scorer = ScoreEngine::new(&config.scoring)?;
        let graph = self.graph.unwrap_or_default();
        let traversal = Arc::new(GraphTraversalEngine::new(graph.clone(), config.graph.clone()));
        let registry = Arc::new(WeightRegistry::new());

        let mut memory = MemoryService::new(
            self.memories.clone(),
            self.vectors.clone(),
            config.dedup.clone(),
            config.search.embedding_timeout(),
        );
        let mut search = HybridSearchEngine::new(
            self.memories.clone(),
            registry.clone(),
            scorer.clone(),
            config.search.clone(),
        )
        .with_strategy(Arc::new(VectorStrategy::new(self.vectors)))
        .with_strategy(Arc::new(KeywordStrategy::new(self.fulltext)))
        .with_strategy(Arc::new(SemanticStrategy::new(self.semantic)))
        .with_strategy(Arc::new(GraphStrategy::new(traversal.clone(), self.memories.clone())));
        if let Some(embedder) = self.embedder {
            memory = memory.with_embedder(embedder.clone());
            search = search.with_embedder(embedder);
        }
        if let Some(reranker) = self.reranker {
            search = search.with_reranker(reranker);
        }
        let snapshots = SnapshotManager::new(graph.clone(), self.snapshots, config.snapshot.clone());

        Ok(MemoryEngine {
            config,
            memories: self.memories,
            memory,
            search,
            registry,
            scorer,
            graph,
            traversal,
            snapshots,
        })
    }
}

pub struct MemoryEngine {
    config: EngineConfig,
    memories: Arc<dyn MemoryStore>,
    memory: MemoryService,
    search: HybridSearchEngine,
    registry: Arc<WeightRegistry>,
    scorer: ScoreEngine,
    graph: Arc<GraphStore>,
    traversal: Arc<GraphTraversalEngine>,
    snapshots: SnapshotManager,
}

impl MemoryEngine {
    /// Engine over the in-memory backends with the hash embedder.
    pub fn in_memory(config: EngineConfig) -> RaeResult<Self> {
        let backend = Arc::new(InMemoryMemoryBackend::new());
        EngineBuilder::new(
            config,
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
            Arc::new(MemorySnapshotStore::new()),
        )
        .embedder(Arc::new(HashEmbeddingProvider::default()))
        .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn traversal(&self) -> &Arc<GraphTraversalEngine> {
        &self.traversal
    }

    pub fn search_engine(&self) -> &HybridSearchEngine {
        &self.search
    }

    // -- memory -------------------------------------------------------------

    pub async fn store_memory(&self, item: MemoryItem) -> RaeResult<StoreOutcome> {
        self.memory.store(item).await
    }

    pub async fn get_memory(&self, scope: &Scope, id: Uuid) -> RaeResult<MemoryItem> {
        self.memory.get(scope, id).await
    }

    pub async fn query_memories(&self, scope: &Scope, filter: &MemoryFilter) -> RaeResult<Vec<MemoryItem>> {
        self.memory.query(scope, filter).await
    }

    pub async fn delete_memory(&self, scope: &Scope, id: Uuid) -> RaeResult<()> {
        self.memory.delete(scope, id).await
    }

    pub async fn record_access(&self, scope: &Scope, id: Uuid) -> RaeResult<MemoryItem> {
        self.memory.record_access(scope, id).await
    }

    pub async fn apply_retention(
        &self,
        scope: &Scope,
        policy: &RetentionPolicy,
    ) -> RaeResult<RetentionReport> {
        apply_retention(self.memories.as_ref(), scope, policy, Utc::now()).await
    }

    /// Importance decay over this engine's memory store, on the configured
    /// interval.
    pub fn decay_task(&self) -> DecayTask {
        DecayTask::new(
            self.memories.clone(),
            self.config.decay.policy(),
            self.config.decay.interval(),
        )
    }

    // -- scoring & search ---------------------------------------------------

    pub fn score(&self, candidate: &ScoreCandidate, now: DateTime<Utc>) -> ScoreBreakdown {
        self.scorer.score(candidate, now)
    }

    pub async fn search_hybrid(&self, request: HybridSearchRequest) -> RaeResult<HybridSearchResponse> {
        self.search.search(request).await
    }

    pub fn list_weight_profiles(&self) -> Vec<WeightProfile> {
        self.registry.list()
    }

    pub fn register_weight_profile(&self, profile: WeightProfile) -> RaeResult<()> {
        self.registry.register(profile)
    }

    // -- graph --------------------------------------------------------------

    pub fn create_node(&self, scope: &Scope, node: GraphNode) -> RaeResult<GraphNode> {
        self.graph.create_node(scope, node)
    }

    pub fn update_node(&self, scope: &Scope, id: Uuid, update: NodeUpdate) -> RaeResult<GraphNode> {
        self.graph.update_node(scope, id, update)
    }

    pub fn activate_node(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphNode> {
        self.graph.activate_node(scope, id)
    }

    pub fn deactivate_node(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphNode> {
        self.graph.deactivate_node(scope, id)
    }

    pub fn batch_create_nodes(&self, scope: &Scope, nodes: Vec<GraphNode>) -> BatchReport {
        self.graph.batch_create_nodes(scope, nodes)
    }

    pub fn create_edge(&self, scope: &Scope, edge: GraphEdge) -> RaeResult<GraphEdge> {
        self.graph.create_edge(scope, edge)
    }

    pub fn update_edge(&self, scope: &Scope, id: Uuid, update: EdgeUpdate) -> RaeResult<GraphEdge> {
        self.graph.update_edge(scope, id, update)
    }

    pub fn activate_edge(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphEdge> {
        self.graph.activate_edge(scope, id)
    }

    pub fn deactivate_edge(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphEdge> {
        self.graph.deactivate_edge(scope, id)
    }

    pub fn batch_create_edges(&self, scope: &Scope, edges: Vec<GraphEdge>) -> BatchReport {
        self.graph.batch_create_edges(scope, edges)
    }

    pub fn traverse(
        &self,
        scope: &Scope,
        start: Uuid,
        algorithm: TraversalAlgorithm,
        options: &TraversalOptions,
    ) -> RaeResult<TraversalResult> {
        self.traversal.traverse(scope, start, algorithm, options)
    }

    pub fn shortest_path(
        &self,
        scope: &Scope,
        start: Uuid,
        end: Uuid,
        options: &PathOptions,
    ) -> RaeResult<PathResult> {
        self.traversal.shortest_path(scope, start, end, options)
    }

    pub fn detect_cycle(
        &self,
        scope: &Scope,
        source: Uuid,
        target: Uuid,
        options: &CycleOptions,
    ) -> RaeResult<CycleResult> {
        self.traversal.detect_cycle(scope, source, target, options)
    }

    pub fn node_metrics(&self, scope: &Scope, id: Uuid) -> RaeResult<NodeDegreeMetrics> {
        self.graph.node_metrics(scope, id)
    }

    /// Partition statistics including snapshot history.
    pub async fn statistics(&self, scope: &Scope) -> RaeResult<GraphStatistics> {
        let stats = self.graph.statistics(scope);
        self.snapshots.annotate(scope, stats).await
    }

    // -- snapshots ----------------------------------------------------------

    pub async fn create_snapshot(&self, scope: &Scope, request: SnapshotRequest) -> RaeResult<GraphSnapshot> {
        self.snapshots.create(scope, request).await
    }

    pub async fn list_snapshots(&self, scope: &Scope) -> RaeResult<Vec<SnapshotSummary>> {
        self.snapshots.list(scope).await
    }

    pub async fn get_snapshot(&self, scope: &Scope, id: Uuid) -> RaeResult<GraphSnapshot> {
        self.snapshots.get(scope, id).await
    }

    pub async fn restore_snapshot(
        &self,
        scope: &Scope,
        id: Uuid,
        options: RestoreOptions,
    ) -> RaeResult<RestoreReport> {
        self.snapshots.restore_with(scope, id, options).await
    }
}
