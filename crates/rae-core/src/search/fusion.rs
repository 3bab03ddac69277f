//! Score normalization, weighted fusion, final ranking and reranking.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rae_state::{MemoryItem, Reranker};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::strategy::{StrategyHit, StrategyKind};
use super::weights::WeightProfile;
use crate::domain::{RaeError, RaeResult};
use crate::scoring::{ScoreBreakdown, ScoreCandidate, ScoreEngine};

/// One strategy's view of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyScore {
    pub raw: f64,
    pub normalized: f64,
    pub explanation: String,
}

/// Fused relevance of one candidate before item-level scoring.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FusedCandidate {
    pub fused: f64,
    pub strategy_scores: BTreeMap<StrategyKind, StrategyScore>,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemoryItem {
    pub item: MemoryItem,
    pub strategy_scores: BTreeMap<StrategyKind, StrategyScore>,
    /// Weighted relevance across strategies, in [0, 1]
    pub fused: f64,
    /// Item-level breakdown; `score.semantic` is `fused`
    pub score: ScoreBreakdown,
    pub rerank_score: Option<f64>,
}

impl ScoredMemoryItem {
    pub fn id(&self) -> Uuid {
        self.item.id
    }

    pub fn final_score(&self) -> f64 {
        self.score.final_score
    }
}

/// Min-max normalize raw scores to [0, 1]. Equal scores all map to 1.0.
pub fn min_max_normalize(raw: &[f64]) -> Vec<f64> {
    let finite = raw.iter().copied().filter(|s| s.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });
    let range = max - min;
    raw.iter()
        .map(|s| {
            if !s.is_finite() {
                0.0
            } else if range <= f64::EPSILON {
                1.0
            } else {
                ((s - min) / range).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Weights of the strategies that produced candidates, renormalized to
/// sum 1.0. When those strategies all carry zero weight they share equally.
pub fn effective_weights(
    per_strategy: &BTreeMap<StrategyKind, Vec<StrategyHit>>,
    weights: &WeightProfile,
) -> BTreeMap<StrategyKind, f64> {
    let producing: Vec<StrategyKind> = per_strategy
        .iter()
        .filter(|(_, hits)| !hits.is_empty())
        .map(|(kind, _)| *kind)
        .collect();
    let sum: f64 = producing.iter().map(|k| weights.weight(*k).max(0.0)).sum();
    producing
        .iter()
        .map(|k| {
            let w = if sum > 0.0 {
                weights.weight(*k).max(0.0) / sum
            } else {
                1.0 / producing.len() as f64
            };
            (*k, w)
        })
        .collect()
}

/// `fused(c) = Σ w[s]·norm[s][c]` over the effective weights.
pub fn fuse(
    per_strategy: &BTreeMap<StrategyKind, Vec<StrategyHit>>,
    weights: &WeightProfile,
) -> HashMap<Uuid, FusedCandidate> {
    let effective = effective_weights(per_strategy, weights);
    let mut fused: HashMap<Uuid, FusedCandidate> = HashMap::new();
    for (kind, hits) in per_strategy {
        let Some(weight) = effective.get(kind) else {
            continue;
        };
        let raw: Vec<f64> = hits.iter().map(|h| h.raw_score).collect();
        for (hit, normalized) in hits.iter().zip(min_max_normalize(&raw)) {
            let candidate = fused.entry(hit.memory_id).or_default();
            // a strategy reporting one id twice keeps its best score
            let previous = candidate.strategy_scores.get(kind).map(|s| s.normalized);
            if previous.is_some_and(|p| p >= normalized) {
                continue;
            }
            candidate.fused += weight * (normalized - previous.unwrap_or(0.0));
            candidate.strategy_scores.insert(
                *kind,
                StrategyScore {
                    raw: hit.raw_score,
                    normalized,
                    explanation: hit.explanation.clone(),
                },
            );
        }
    }
    for candidate in fused.values_mut() {
        candidate.fused = candidate.fused.clamp(0.0, 1.0);
    }
    fused
}

/// Final score desc, then more recent `last_accessed_at`, then id.
pub fn rank_order(a: &ScoredMemoryItem, b: &ScoredMemoryItem) -> Ordering {
    b.final_score()
        .total_cmp(&a.final_score())
        .then_with(|| b.item.last_accessed_at.cmp(&a.item.last_accessed_at))
        .then_with(|| a.item.id.cmp(&b.item.id))
}

/// Score fused candidates with the item-level engine and sort them.
/// Candidates without a loaded item are dropped.
pub fn rank(
    fused: HashMap<Uuid, FusedCandidate>,
    items: &HashMap<Uuid, MemoryItem>,
    engine: &ScoreEngine,
    now: DateTime<Utc>,
) -> Vec<ScoredMemoryItem> {
    let mut ranked: Vec<ScoredMemoryItem> = fused
        .into_iter()
        .filter_map(|(id, candidate)| {
            let item = items.get(&id)?;
            let score = engine.score(&ScoreCandidate::from_item(item, candidate.fused), now);
            Some(ScoredMemoryItem {
                item: item.clone(),
                strategy_scores: candidate.strategy_scores,
                fused: candidate.fused,
                score,
                rerank_score: None,
            })
        })
        .collect();
    ranked.sort_by(rank_order);
    ranked
}

/// Reorder the first `top_n` results by reranker score. Equal rerank scores
/// keep their current order. On error the results are left untouched.
pub async fn rerank(
    results: &mut [ScoredMemoryItem],
    reranker: &dyn Reranker,
    query: &str,
    top_n: usize,
) -> RaeResult<()> {
    let n = top_n.min(results.len());
    if n < 2 {
        return Ok(());
    }
    let candidates: Vec<(Uuid, String)> = results[..n]
        .iter()
        .map(|r| (r.item.id, r.item.content.clone()))
        .collect();
    let scores = reranker.rerank(query, &candidates).await?;
    if scores.len() != n {
        return Err(RaeError::Unavailable(format!(
            "reranker returned {} scores for {n} candidates",
            scores.len()
        )));
    }
    for (result, score) in results[..n].iter_mut().zip(scores) {
        result.rerank_score = Some(score);
    }
    results[..n].sort_by(|a, b| {
        let sa = a.rerank_score.unwrap_or(f64::NEG_INFINITY);
        let sb = b.rerank_score.unwrap_or(f64::NEG_INFINITY);
        sb.total_cmp(&sa)
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use rae_state::{MemoryLayer, Scope, StorageResult};

    fn hit(id: Uuid, raw: f64) -> StrategyHit {
        StrategyHit::new(id, raw, "test")
    }

    fn item(content: &str) -> MemoryItem {
        MemoryItem::new(&Scope::new("t", "p"), MemoryLayer::Semantic, content)
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[0.3, 0.3]), vec![1.0, 1.0]);
        assert_eq!(min_max_normalize(&[f64::NAN, 1.0]), vec![0.0, 1.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_silent_strategies_do_not_cap_scores() {
        let id = Uuid::new_v4();
        let mut per = BTreeMap::new();
        per.insert(StrategyKind::Vector, vec![hit(id, 0.9)]);
        per.insert(StrategyKind::Graph, Vec::new());
        let fused = fuse(&per, &WeightProfile::new("w", 0.35, 0.20, 0.25, 0.20));
        assert!((fused[&id].fused - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fused_is_weighted_sum() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut per = BTreeMap::new();
        per.insert(StrategyKind::Vector, vec![hit(a, 0.9), hit(b, 0.1)]);
        per.insert(StrategyKind::Keyword, vec![hit(b, 5.0), hit(a, 1.0)]);
        let weights = WeightProfile::new("w", 0.75, 0.25, 0.0, 0.0);
        let fused = fuse(&per, &weights);
        assert!((fused[&a].fused - 0.75).abs() < 1e-9);
        assert!((fused[&b].fused - 0.25).abs() < 1e-9);
        assert_eq!(fused[&a].strategy_scores.len(), 2);
    }

    #[test]
    fn test_zero_weight_producers_share_equally() {
        let id = Uuid::new_v4();
        let mut per = BTreeMap::new();
        per.insert(StrategyKind::Graph, vec![hit(id, 1.0)]);
        let effective = effective_weights(&per, &WeightProfile::new("w", 1.0, 0.0, 0.0, 0.0));
        assert_eq!(effective[&StrategyKind::Graph], 1.0);
    }

    #[test]
    fn test_rank_tie_break() {
        let now = Utc::now();
        let created = now - Duration::days(1);
        let older = item("a").with_created_at(created);
        let touched = item("b")
            .with_created_at(created)
            .with_last_accessed_at(created);
        let mut items = HashMap::new();
        let mut fused = HashMap::new();
        for it in [&older, &touched] {
            items.insert(it.id, it.clone());
            fused.insert(
                it.id,
                FusedCandidate {
                    fused: 0.5,
                    strategy_scores: BTreeMap::new(),
                },
            );
        }
        // recency and usage zeroed so both final scores tie
        let engine = ScoreEngine::default()
            .with_weights(crate::scoring::ScoreWeights::new(1.0, 1.0, 0.0, 0.0))
            .unwrap();
        let ranked = rank(fused, &items, &engine, now);
        assert_eq!(ranked[0].final_score(), ranked[1].final_score());
        assert_eq!(ranked[0].item.id, touched.id);
    }

    struct Reverse;

    #[async_trait]
    impl Reranker for Reverse {
        async fn rerank(&self, _q: &str, candidates: &[(Uuid, String)]) -> StorageResult<Vec<f64>> {
            Ok((0..candidates.len()).map(|i| i as f64).collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl Reranker for Broken {
        async fn rerank(&self, _q: &str, _c: &[(Uuid, String)]) -> StorageResult<Vec<f64>> {
            Err(rae_state::StorageError::Backend("down".into()))
        }
    }

    fn scored(content: &str, final_score: f64) -> ScoredMemoryItem {
        ScoredMemoryItem {
            item: item(content),
            strategy_scores: BTreeMap::new(),
            fused: final_score,
            score: ScoreBreakdown {
                final_score,
                ..ScoreBreakdown::default()
            },
            rerank_score: None,
        }
    }

    #[tokio::test]
    async fn test_rerank_reorders_top_n_only() {
        let mut results = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let ids: Vec<Uuid> = results.iter().map(|r| r.id()).collect();
        rerank(&mut results, &Reverse, "q", 2).await.unwrap();
        assert_eq!(results[0].id(), ids[1]);
        assert_eq!(results[1].id(), ids[0]);
        assert_eq!(results[2].id(), ids[2]);
        assert!(results[2].rerank_score.is_none());
    }

    #[tokio::test]
    async fn test_rerank_failure_leaves_order() {
        let mut results = vec![scored("a", 0.9), scored("b", 0.8)];
        let ids: Vec<Uuid> = results.iter().map(|r| r.id()).collect();
        assert!(rerank(&mut results, &Broken, "q", 5).await.is_err());
        assert_eq!(results.iter().map(|r| r.id()).collect::<Vec<_>>(), ids);
    }
}
