//! Retrieval strategies.
//!
//! Every strategy turns a [`StrategyQuery`] into raw-scored candidate
//! memory ids. Raw scores are only comparable within one strategy; fusion
//! normalizes them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rae_state::{
    FulltextIndex, IndexHit, MemoryFilter, MemoryStore, Scope, SemanticIndex, VectorIndex,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{RaeError, RaeResult};
use crate::graph::{Direction, GraphTraversalEngine, TraversalOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Vector,
    Keyword,
    Semantic,
    Graph,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Vector,
        StrategyKind::Keyword,
        StrategyKind::Semantic,
        StrategyKind::Graph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Vector => "vector",
            StrategyKind::Keyword => "keyword",
            StrategyKind::Semantic => "semantic",
            StrategyKind::Graph => "graph",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(StrategyKind::Vector),
            "keyword" | "fulltext" => Ok(StrategyKind::Keyword),
            "semantic" => Ok(StrategyKind::Semantic),
            "graph" => Ok(StrategyKind::Graph),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// One candidate produced by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyHit {
    pub memory_id: Uuid,
    pub raw_score: f64,
    pub explanation: String,
}

impl StrategyHit {
    pub fn new(memory_id: Uuid, raw_score: f64, explanation: impl Into<String>) -> Self {
        Self {
            memory_id,
            raw_score,
            explanation: explanation.into(),
        }
    }
}

/// Where the graph strategy starts and how far it walks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSeeds {
    /// Explicit start nodes by external key; empty means match the query text
    pub start_keys: Vec<String>,
    pub max_depth: usize,
}

/// Input shared by every strategy of one search.
#[derive(Debug, Clone)]
pub struct StrategyQuery {
    pub scope: Scope,
    pub text: String,
    /// Query embedding; the vector strategy fails without one
    pub embedding: Option<Vec<f32>>,
    pub filter: MemoryFilter,
    /// Candidates to return
    pub k: usize,
    pub graph: GraphSeeds,
}

/// One retrieval strategy. Failures are reported per strategy and never
/// abort the other strategies of the same search.
#[async_trait]
pub trait SearchStrategyExecutor: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Up to `query.k` hits, best first.
    async fn execute(&self, query: &StrategyQuery) -> RaeResult<Vec<StrategyHit>>;
}

fn hits_from_index(hits: Vec<IndexHit>, label: &str) -> Vec<StrategyHit> {
    hits.into_iter()
        .map(|h| StrategyHit::new(h.id, h.score, format!("{label} {:.4}", h.score)))
        .collect()
}

// ---------------------------------------------------------------------------
// Index-backed strategies
// ---------------------------------------------------------------------------

pub struct VectorStrategy {
    index: Arc<dyn VectorIndex>,
}

impl VectorStrategy {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SearchStrategyExecutor for VectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    async fn execute(&self, query: &StrategyQuery) -> RaeResult<Vec<StrategyHit>> {
        let Some(embedding) = &query.embedding else {
            return Err(RaeError::Unavailable("query embedding unavailable".to_string()));
        };
        let hits = self
            .index
            .search(&query.scope, embedding, query.k, &query.filter)
            .await?;
        Ok(hits_from_index(hits, "cosine"))
    }
}

pub struct KeywordStrategy {
    index: Arc<dyn FulltextIndex>,
}

impl KeywordStrategy {
    pub fn new(index: Arc<dyn FulltextIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SearchStrategyExecutor for KeywordStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Keyword
    }

    async fn execute(&self, query: &StrategyQuery) -> RaeResult<Vec<StrategyHit>> {
        let hits = self
            .index
            .search(&query.scope, &query.text, query.k, &query.filter)
            .await?;
        Ok(hits_from_index(hits, "bm25"))
    }
}

pub struct SemanticStrategy {
    index: Arc<dyn SemanticIndex>,
}

impl SemanticStrategy {
    pub fn new(index: Arc<dyn SemanticIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SearchStrategyExecutor for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    async fn execute(&self, query: &StrategyQuery) -> RaeResult<Vec<StrategyHit>> {
        let hits = self
            .index
            .search(&query.scope, &query.text, query.k, &query.filter)
            .await?;
        Ok(hits_from_index(hits, "concepts"))
    }
}

// ---------------------------------------------------------------------------
// Graph strategy
// ---------------------------------------------------------------------------

/// Walks the knowledge graph from seed nodes and scores the memories linked
/// to each reached node by `1 / (1 + hops + Σ(1 − weight))`.
pub struct GraphStrategy {
    traversal: Arc<GraphTraversalEngine>,
    memories: Arc<dyn MemoryStore>,
}

impl GraphStrategy {
    pub fn new(traversal: Arc<GraphTraversalEngine>, memories: Arc<dyn MemoryStore>) -> Self {
        Self {
            traversal,
            memories,
        }
    }

    /// Seed node ids: explicit keys when given, else active nodes whose key
    /// or label occurs in the query text.
    fn seeds(&self, query: &StrategyQuery) -> Vec<Uuid> {
        let store = self.traversal.store();
        if !query.graph.start_keys.is_empty() {
            return store.read(&query.scope, |p| {
                query
                    .graph
                    .start_keys
                    .iter()
                    .filter_map(|key| p.node_by_key(key))
                    .filter(|n| n.is_active)
                    .map(|n| n.id)
                    .collect()
            });
        }
        let text = query.text.to_lowercase();
        store.read(&query.scope, |p| {
            let mut seeds: Vec<_> = p
                .nodes()
                .filter(|n| n.is_active)
                .filter(|n| {
                    mentions(&text, &n.external_key) || mentions(&text, &n.label)
                })
                .map(|n| n.id)
                .collect();
            seeds.sort();
            seeds
        })
    }
}

fn mentions(text: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    needle.chars().count() >= 2 && text.contains(&needle)
}

#[async_trait]
impl SearchStrategyExecutor for GraphStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Graph
    }

    async fn execute(&self, query: &StrategyQuery) -> RaeResult<Vec<StrategyHit>> {
        let seeds = self.seeds(query);
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let options = TraversalOptions::new()
            .with_max_depth(query.graph.max_depth)
            .with_direction(Direction::Both)
            .at(Utc::now());

        // best score and the explanation that produced it, per memory
        let mut best: HashMap<Uuid, (f64, String)> = HashMap::new();
        for seed in seeds {
            let result = self.traversal.bfs(&query.scope, seed, &options)?;
            let linked: Vec<(Vec<Uuid>, f64, String)> =
                self.traversal.store().read(&query.scope, |p| {
                    result
                        .steps
                        .iter()
                        .filter_map(|step| {
                            let node = p.node(step.node_id)?;
                            let score = 1.0 / (1.0 + step.depth as f64 + step.weight_penalty);
                            let why = format!("{} hops from seed via {}", step.depth, node.external_key);
                            Some((node.memory_ids(), score, why))
                        })
                        .collect()
                });
            for (ids, score, why) in linked {
                for id in ids {
                    let entry = best.entry(id).or_insert((f64::MIN, String::new()));
                    if score > entry.0 {
                        *entry = (score, why.clone());
                    }
                }
            }
        }

        let ids: Vec<Uuid> = best.keys().copied().collect();
        let items = self.memories.get_many(&query.scope, &ids).await?;
        let mut hits: Vec<StrategyHit> = items
            .iter()
            .filter(|item| query.filter.matches(item))
            .filter_map(|item| {
                best.remove(&item.id)
                    .map(|(score, why)| StrategyHit::new(item.id, score, why))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.raw_score
                .total_cmp(&a.raw_score)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        hits.truncate(query.k);
        debug!(event = "search.graph_hits", hits = hits.len());
        Ok(hits)
    }
}
