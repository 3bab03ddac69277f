//! Engine configuration.
//!
//! `EngineConfig` deserializes from any serde format with every field
//! optional; missing values fall back to the defaults below. Environment
//! overrides use the `RAE_` prefix:
//!
//! - `RAE_DEDUP_ENABLED`, `RAE_DEDUP_THRESHOLD`
//! - `RAE_SEARCH_DEFAULT_K`, `RAE_SEARCH_MAX_K`, `RAE_STRATEGY_TIMEOUT_MS`,
//!   `RAE_INTENT_THRESHOLD`, `RAE_DEFAULT_PROFILE`, `RAE_RERANK_TOP_N`
//! - `RAE_GRAPH_MAX_DEPTH`, `RAE_GRAPH_VISIT_BUDGET`
//! - `RAE_AUTO_BACKUP`
//! - `RAE_DECAY_RATE`, `RAE_DECAY_FLOOR`, `RAE_DECAY_INTERVAL_SECS`

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ValidationError;
use crate::scoring::{ImportanceDecayPolicy, ScoreWeights};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// λ_base of the recency decay, per second
    pub recency_lambda: f64,
    /// Usage count at which the usage component reaches 1.0
    pub usage_saturation: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            recency_lambda: 1e-5,
            usage_saturation: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    /// Similarity at or above which a new item is a duplicate
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub strategy_timeout_ms: u64,
    pub embedding_timeout_ms: u64,
    /// Candidates requested from each strategy
    pub max_results_per_strategy: usize,
    /// Intent confidence below which the default profile is used
    pub intent_confidence_threshold: f64,
    pub default_profile: String,
    pub rerank_top_n: usize,
    /// Hop limit of the graph strategy
    pub graph_max_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            max_k: 100,
            strategy_timeout_ms: 2_000,
            embedding_timeout_ms: 2_000,
            max_results_per_strategy: 50,
            intent_confidence_threshold: 0.5,
            default_profile: "balanced".to_string(),
            rerank_top_n: 20,
            graph_max_depth: 3,
        }
    }
}

impl SearchConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Hard cap on any traversal depth
    pub max_depth_cap: usize,
    /// Nodes a single traversal may visit
    pub visit_budget: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth_cap: 50,
            visit_budget: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Capture the current state before a replace restore
    pub auto_backup: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { auto_backup: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub rate: f64,
    pub floor: f64,
    pub protect_days: i64,
    pub stale_days: i64,
    pub interval_secs: u64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        let policy = ImportanceDecayPolicy::default();
        Self {
            rate: policy.rate,
            floor: policy.floor,
            protect_days: policy.protect_days,
            stale_days: policy.stale_days,
            interval_secs: 86_400,
        }
    }
}

impl DecayConfig {
    pub fn policy(&self) -> ImportanceDecayPolicy {
        ImportanceDecayPolicy {
            rate: self.rate,
            floor: self.floor,
            protect_days: self.protect_days,
            stale_days: self.stale_days,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub dedup: DedupConfig,
    pub search: SearchConfig,
    pub graph: GraphConfig,
    pub snapshot: SnapshotConfig,
    pub decay: DecayConfig,
}

impl EngineConfig {
    /// Defaults with `RAE_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ValidationError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ValidationError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "RAE_DEDUP_ENABLED", &mut self.dedup.enabled)?;
        override_value(
            &lookup,
            "RAE_DEDUP_THRESHOLD",
            &mut self.dedup.similarity_threshold,
        )?;
        override_value(&lookup, "RAE_SEARCH_DEFAULT_K", &mut self.search.default_k)?;
        override_value(&lookup, "RAE_SEARCH_MAX_K", &mut self.search.max_k)?;
        override_value(
            &lookup,
            "RAE_STRATEGY_TIMEOUT_MS",
            &mut self.search.strategy_timeout_ms,
        )?;
        override_value(
            &lookup,
            "RAE_INTENT_THRESHOLD",
            &mut self.search.intent_confidence_threshold,
        )?;
        override_value(&lookup, "RAE_DEFAULT_PROFILE", &mut self.search.default_profile)?;
        override_value(&lookup, "RAE_RERANK_TOP_N", &mut self.search.rerank_top_n)?;
        override_value(&lookup, "RAE_GRAPH_MAX_DEPTH", &mut self.graph.max_depth_cap)?;
        override_value(&lookup, "RAE_GRAPH_VISIT_BUDGET", &mut self.graph.visit_budget)?;
        override_value(&lookup, "RAE_AUTO_BACKUP", &mut self.snapshot.auto_backup)?;
        override_value(&lookup, "RAE_DECAY_RATE", &mut self.decay.rate)?;
        override_value(&lookup, "RAE_DECAY_FLOOR", &mut self.decay.floor)?;
        override_value(
            &lookup,
            "RAE_DECAY_INTERVAL_SECS",
            &mut self.decay.interval_secs,
        )?;
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scoring.weights.normalized()?;
        if !self.scoring.recency_lambda.is_finite() || self.scoring.recency_lambda < 0.0 {
            return Err(invalid("scoring.recency_lambda must be non-negative"));
        }
        unit("dedup.similarity_threshold", self.dedup.similarity_threshold)?;
        unit(
            "search.intent_confidence_threshold",
            self.search.intent_confidence_threshold,
        )?;
        if self.search.default_k == 0 || self.search.default_k > self.search.max_k {
            return Err(invalid(format!(
                "search.default_k must be within 1..={}, got {}",
                self.search.max_k, self.search.default_k
            )));
        }
        if self.search.strategy_timeout_ms == 0 || self.search.embedding_timeout_ms == 0 {
            return Err(invalid("search timeouts must be positive"));
        }
        if self.search.max_results_per_strategy == 0 {
            return Err(invalid("search.max_results_per_strategy must be positive"));
        }
        if self.search.default_profile.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "search.default_profile",
            });
        }
        if self.graph.max_depth_cap == 0 || self.graph.visit_budget == 0 {
            return Err(invalid("graph limits must be positive"));
        }
        if self.search.graph_max_depth > self.graph.max_depth_cap {
            return Err(invalid(format!(
                "search.graph_max_depth {} exceeds graph.max_depth_cap {}",
                self.search.graph_max_depth, self.graph.max_depth_cap
            )));
        }
        unit("decay.rate", self.decay.rate)?;
        unit("decay.floor", self.decay.floor)?;
        if self.decay.protect_days < 0
            || self.decay.protect_days >= self.decay.stale_days
        {
            return Err(invalid("decay.protect_days must be below decay.stale_days"));
        }
        if self.decay.interval_secs == 0 {
            return Err(invalid("decay.interval_secs must be positive"));
        }
        Ok(())
    }
}

fn override_value<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ValidationError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| invalid(format!("{key}={raw:?}: {e}")))?;
    }
    Ok(())
}

fn unit(field: &'static str, value: f64) -> Result<(), ValidationError> {
    crate::domain::validation::check_unit_interval(field, value).map(|_| ())
}

fn invalid(msg: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig(msg.into())
}
