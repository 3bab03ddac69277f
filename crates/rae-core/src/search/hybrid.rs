//! Hybrid search: concurrent strategies, weighted fusion, item scoring.
//!
//! Strategies run concurrently, each under its own timeout. A strategy that
//! fails or times out contributes nothing and is listed in
//! `strategies_degraded`; the search errors only when every strategy that
//! ran has failed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rae_state::{EmbeddingProvider, MemoryFilter, MemoryItem, MemoryStore, Reranker, Scope};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, Instrument};
use uuid::Uuid;

use super::fusion::{fuse, rank, rerank, ScoredMemoryItem};
use super::intent::{QueryAnalyzer, QueryIntent};
use super::strategy::{GraphSeeds, SearchStrategyExecutor, StrategyHit, StrategyKind, StrategyQuery};
use super::weights::{select_weights, WeightOverride, WeightProfile, WeightRegistry, WeightSource};
use crate::config::SearchConfig;
use crate::domain::validation::{check_not_empty, check_scope};
use crate::domain::{RaeError, RaeResult, ValidationError};
use crate::metrics::ENGINE_METRICS;
use crate::obs;
use crate::scoring::ScoreEngine;

/// One hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSearchRequest {
    pub scope: Scope,
    pub query: String,
    /// Results to return; the configured default when unset
    pub k: Option<usize>,
    pub filter: MemoryFilter,
    pub weight_override: Option<WeightOverride>,
    /// Strategies allowed to run; every registered one when unset
    pub strategies: Option<BTreeSet<StrategyKind>>,
    pub graph_start_keys: Vec<String>,
    pub graph_max_depth: Option<usize>,
    pub rerank: bool,
    /// Precomputed query embedding
    pub embedding: Option<Vec<f32>>,
}

impl HybridSearchRequest {
    pub fn new(scope: &Scope, query: impl Into<String>) -> Self {
        Self {
            scope: scope.clone(),
            query: query.into(),
            k: None,
            filter: MemoryFilter::all(),
            weight_override: None,
            strategies: None,
            graph_start_keys: Vec::new(),
            graph_max_depth: None,
            rerank: true,
            embedding: None,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.weight_override = Some(WeightOverride::Profile(name.into()));
        self
    }

    pub fn with_weights(mut self, weights: WeightProfile) -> Self {
        self.weight_override = Some(WeightOverride::Custom(weights));
        self
    }

    /// Run only the given strategies.
    pub fn only<I: IntoIterator<Item = StrategyKind>>(mut self, kinds: I) -> Self {
        self.strategies = Some(kinds.into_iter().collect());
        self
    }

    pub fn disable(mut self, kind: StrategyKind) -> Self {
        let enabled = self
            .strategies
            .get_or_insert_with(|| StrategyKind::ALL.into_iter().collect());
        enabled.remove(&kind);
        self
    }

    pub fn with_graph_start(mut self, external_key: impl Into<String>) -> Self {
        self.graph_start_keys.push(external_key.into());
        self
    }

    pub fn with_graph_depth(mut self, depth: usize) -> Self {
        self.graph_max_depth = Some(depth);
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn with_query_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    fn allows(&self, kind: StrategyKind) -> bool {
        self.strategies.as_ref().map_or(true, |s| s.contains(&kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Ok,
    Failed,
    TimedOut,
    /// Disabled by the request or weighted zero
    Skipped,
}

/// Per-strategy outcome of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub kind: StrategyKind,
    pub status: StrategyStatus,
    pub candidates: usize,
    /// Share of the fused score after renormalization
    pub effective_weight: f64,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSearchResponse {
    pub results: Vec<ScoredMemoryItem>,
    /// Normalized weights used for fusion
    pub profile: WeightProfile,
    pub weight_source: WeightSource,
    pub intent: QueryIntent,
    pub strategies: Vec<StrategyReport>,
    /// Names of failed strategies, plus "rerank" when reranking failed
    pub strategies_degraded: Vec<String>,
    pub total_candidates: usize,
    pub duration_ms: u64,
}

impl HybridSearchResponse {
    pub fn is_degraded(&self) -> bool {
        !self.strategies_degraded.is_empty()
    }

    /// Turn a degraded response into `RaeError::Degraded`.
    pub fn into_strict(self) -> RaeResult<Self> {
        if self.is_degraded() {
            return Err(RaeError::Degraded {
                strategies: self.strategies_degraded,
            });
        }
        Ok(self)
    }
}

enum Outcome {
    Hits(Vec<StrategyHit>),
    Failed(String),
    TimedOut,
}

/// Runs registered strategies and fuses their results.
pub struct HybridSearchEngine {
    strategies: Vec<Arc<dyn SearchStrategyExecutor>>,
    memories: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
    analyzer: QueryAnalyzer,
    registry: Arc<WeightRegistry>,
    scorer: ScoreEngine,
    config: SearchConfig,
}

impl HybridSearchEngine {
    pub fn new(
        memories: Arc<dyn MemoryStore>,
        registry: Arc<WeightRegistry>,
        scorer: ScoreEngine,
        config: SearchConfig,
    ) -> Self {
        Self {
            strategies: Vec::new(),
            memories,
            embedder: None,
            reranker: None,
            analyzer: QueryAnalyzer::new(),
            registry,
            scorer,
            config,
        }
    }

    /// Register a strategy; a later one of the same kind replaces it.
    pub fn with_strategy(mut self, strategy: Arc<dyn SearchStrategyExecutor>) -> Self {
        self.strategies.retain(|s| s.kind() != strategy.kind());
        self.strategies.push(strategy);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_analyzer(mut self, analyzer: QueryAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn registry(&self) -> &Arc<WeightRegistry> {
        &self.registry
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    fn resolve_k(&self, k: Option<usize>) -> RaeResult<usize> {
        let k = k.unwrap_or(self.config.default_k);
        if k == 0 {
            return Err(ValidationError::OutOfRange {
                field: "k",
                value: 0.0,
                min: 1.0,
                max: self.config.max_k as f64,
            }
            .into());
        }
        if k > self.config.max_k {
            return Err(RaeError::Capacity {
                resource: "k",
                limit: self.config.max_k,
            });
        }
        Ok(k)
    }

    async fn query_embedding(&self, request: &HybridSearchRequest) -> Option<Vec<f32>> {
        if let Some(embedding) = &request.embedding {
            return Some(embedding.clone());
        }
        let embedder = self.embedder.as_ref()?;
        let timeout = self.config.embedding_timeout();
        match tokio::time::timeout(timeout, embedder.embed(&request.query)).await {
            Ok(Ok(embedding)) => Some(embedding),
            Ok(Err(err)) => {
                obs::emit_strategy_degraded("embedding", &err);
                None
            }
            Err(_) => {
                obs::emit_strategy_degraded("embedding", &"timed out");
                None
            }
        }
    }

    pub async fn search(&self, request: HybridSearchRequest) -> RaeResult<HybridSearchResponse> {
        let span = obs::query_span(&request.scope, &request.query);
        self.search_inner(request).instrument(span).await
    }

    async fn search_inner(&self, request: HybridSearchRequest) -> RaeResult<HybridSearchResponse> {
        let started = Instant::now();
        check_scope(&request.scope)?;
        check_not_empty("query", &request.query)?;
        let k = self.resolve_k(request.k)?;

        let intent = self.analyzer.classify(&request.query);
        let (profile, weight_source) = select_weights(
            &self.registry,
            &intent,
            request.weight_override.as_ref(),
            self.config.intent_confidence_threshold,
            &self.config.default_profile,
        )?;
        debug!(
            event = "search.weights",
            intent = %intent.category,
            confidence = intent.confidence,
            profile = %profile.name,
        );

        let (active, skipped): (Vec<_>, Vec<_>) = self
            .strategies
            .iter()
            .partition(|s| request.allows(s.kind()) && profile.weight(s.kind()) > 0.0);
        if active.is_empty() {
            return Err(ValidationError::InvalidConfig(
                "no search strategy is enabled for this request".to_string(),
            )
            .into());
        }

        let embedding = if active.iter().any(|s| s.kind() == StrategyKind::Vector) {
            self.query_embedding(&request).await
        } else {
            None
        };
        let query = StrategyQuery {
            scope: request.scope.clone(),
            text: request.query.clone(),
            embedding,
            filter: request.filter.clone(),
            k: self.config.max_results_per_strategy.max(k),
            graph: GraphSeeds {
                start_keys: request.graph_start_keys.clone(),
                max_depth: request.graph_max_depth.unwrap_or(self.config.graph_max_depth),
            },
        };

        let timeout = self.config.strategy_timeout();
        let query_ref = &query;
        let outcomes = join_all(active.iter().map(|strategy| async move {
            let began = Instant::now();
            let outcome = match tokio::time::timeout(timeout, strategy.execute(query_ref)).await {
                Ok(Ok(hits)) => Outcome::Hits(hits),
                Ok(Err(err)) => Outcome::Failed(err.to_string()),
                Err(_) => Outcome::TimedOut,
            };
            (strategy.kind(), outcome, began.elapsed().as_millis() as u64)
        }))
        .await;

        let mut per_strategy: BTreeMap<StrategyKind, Vec<StrategyHit>> = BTreeMap::new();
        let mut reports = Vec::new();
        let mut degraded = Vec::new();
        for (kind, outcome, duration_ms) in outcomes {
            let (status, candidates, error) = match outcome {
                Outcome::Hits(hits) => {
                    let n = hits.len();
                    per_strategy.insert(kind, hits);
                    (StrategyStatus::Ok, n, None)
                }
                Outcome::Failed(reason) => (StrategyStatus::Failed, 0, Some(reason)),
                Outcome::TimedOut => (
                    StrategyStatus::TimedOut,
                    0,
                    Some(format!("timed out after {}ms", timeout.as_millis())),
                ),
            };
            if let Some(reason) = &error {
                obs::emit_strategy_degraded(kind.as_str(), reason);
                degraded.push(kind.as_str().to_string());
            }
            reports.push(StrategyReport {
                kind,
                status,
                candidates,
                effective_weight: 0.0,
                duration_ms,
                error,
            });
        }
        for strategy in skipped {
            reports.push(StrategyReport {
                kind: strategy.kind(),
                status: StrategyStatus::Skipped,
                candidates: 0,
                effective_weight: 0.0,
                duration_ms: 0,
                error: None,
            });
        }

        if per_strategy.is_empty() {
            ENGINE_METRICS.add_strategies_degraded(degraded.len() as u64);
            return Err(RaeError::Unavailable(format!(
                "every search strategy failed: {}",
                degraded.join(", ")
            )));
        }

        let effective = super::fusion::effective_weights(&per_strategy, &profile);
        for report in &mut reports {
            report.effective_weight = effective.get(&report.kind).copied().unwrap_or(0.0);
        }

        let fused = fuse(&per_strategy, &profile);
        let total_candidates = fused.len();
        let ids: Vec<Uuid> = fused.keys().copied().collect();
        let items: HashMap<Uuid, MemoryItem> = self
            .memories
            .get_many(&request.scope, &ids)
            .await?
            .into_iter()
            .filter(|item| request.filter.matches(item))
            .map(|item| (item.id, item))
            .collect();
        let mut results = rank(fused, &items, &self.scorer, Utc::now());

        if request.rerank {
            if let Some(reranker) = &self.reranker {
                if let Err(err) =
                    rerank(&mut results, reranker.as_ref(), &request.query, self.config.rerank_top_n).await
                {
                    obs::emit_strategy_degraded("rerank", &err);
                    degraded.push("rerank".to_string());
                }
            }
        }
        results.truncate(k);

        let duration_ms = started.elapsed().as_millis() as u64;
        ENGINE_METRICS.inc_searches();
        ENGINE_METRICS.add_strategies_degraded(degraded.len() as u64);
        obs::emit_search_completed(
            &request.scope,
            &profile.name,
            results.len(),
            degraded.len(),
            duration_ms,
        );

        Ok(HybridSearchResponse {
            results,
            profile,
            weight_source,
            intent,
            strategies: reports,
            strategies_degraded: degraded,
            total_candidates,
            duration_ms,
        })
    }
}
