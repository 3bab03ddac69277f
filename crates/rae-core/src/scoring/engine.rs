//! Combined relevance score over similarity, importance, recency and usage.

use chrono::{DateTime, Utc};
use rae_state::MemoryItem;
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::domain::ValidationError;

/// Relative weight of each score component.
///
/// Any non-negative combination with a positive sum is accepted; the engine
/// normalizes to sum 1.0 before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub semantic: f64,
    pub importance: f64,
    pub recency: f64,
    pub usage: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            importance: 0.25,
            recency: 0.15,
            usage: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn new(semantic: f64, importance: f64, recency: f64, usage: f64) -> Self {
        Self {
            semantic,
            importance,
            recency,
            usage,
        }
    }

    fn as_array(&self) -> [f64; 4] {
        [self.semantic, self.importance, self.recency, self.usage]
    }

    /// Copy scaled to sum 1.0.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let values = self.as_array();
        if values.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ValidationError::InvalidWeights(format!(
                "score weights must be finite and non-negative: {values:?}"
            )));
        }
        let sum: f64 = values.iter().sum();
        if sum <= 0.0 {
            return Err(ValidationError::InvalidWeights(
                "score weights sum to zero".to_string(),
            ));
        }
        Ok(Self::new(
            self.semantic / sum,
            self.importance / sum,
            self.recency / sum,
            self.usage / sum,
        ))
    }
}

/// Inputs to one score computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCandidate {
    /// Query relevance in [0, 1]; out-of-range values are clamped
    pub similarity: f64,
    pub importance: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
}

impl ScoreCandidate {
    pub fn from_item(item: &MemoryItem, similarity: f64) -> Self {
        Self {
            similarity,
            importance: item.importance,
            created_at: Some(item.created_at),
            last_accessed_at: item.last_accessed_at,
            usage_count: item.usage_count,
        }
    }
}

/// Per-component explanation of a final score. Every field is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic: f64,
    pub recency: f64,
    pub importance: f64,
    pub usage: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
}

/// Stateless scorer.
#[derive(Debug, Clone)]
pub struct ScoreEngine {
    weights: ScoreWeights,
    lambda_base: f64,
    usage_saturation: u64,
}

impl Default for ScoreEngine {
    fn default() -> Self {
        let config = ScoringConfig::default();
        Self {
            weights: config.weights,
            lambda_base: config.recency_lambda,
            usage_saturation: config.usage_saturation,
        }
    }
}

impl ScoreEngine {
    pub fn new(config: &ScoringConfig) -> Result<Self, ValidationError> {
        if !config.recency_lambda.is_finite() || config.recency_lambda < 0.0 {
            return Err(ValidationError::InvalidConfig(format!(
                "recency_lambda must be finite and non-negative, got {}",
                config.recency_lambda
            )));
        }
        Ok(Self {
            weights: config.weights.normalized()?,
            lambda_base: config.recency_lambda,
            usage_saturation: config.usage_saturation.max(1),
        })
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Replace the component weights.
    pub fn with_weights(mut self, weights: ScoreWeights) -> Result<Self, ValidationError> {
        self.weights = weights.normalized()?;
        Ok(self)
    }

    /// `exp(-λ_eff·Δt)` with `λ_eff = λ_base / (ln(1+n)+1)`.
    ///
    /// Future reference times give 1.0, a missing one gives 0.0.
    pub fn recency(
        &self,
        reference: Option<DateTime<Utc>>,
        access_count: u64,
        now: DateTime<Utc>,
    ) -> f64 {
        let Some(reference) = reference else {
            return 0.0;
        };
        let delta = (now - reference).num_milliseconds() as f64 / 1000.0;
        if delta <= 0.0 {
            return 1.0;
        }
        let lambda_eff = self.lambda_base / ((1.0 + access_count as f64).ln() + 1.0);
        (-lambda_eff * delta).exp().clamp(0.0, 1.0)
    }

    /// `min(1, ln(1+n) / ln(1+saturation))`.
    pub fn usage(&self, usage_count: u64) -> f64 {
        let saturation = (1.0 + self.usage_saturation as f64).ln();
        ((1.0 + usage_count as f64).ln() / saturation).min(1.0)
    }

    pub fn score(&self, candidate: &ScoreCandidate, now: DateTime<Utc>) -> ScoreBreakdown {
        let semantic = unit(candidate.similarity);
        let importance = unit(candidate.importance);
        let reference = candidate.last_accessed_at.or(candidate.created_at);
        let recency = self.recency(reference, candidate.usage_count, now);
        let usage = self.usage(candidate.usage_count);

        let w = &self.weights;
        let final_score = w.semantic * semantic
            + w.importance * importance
            + w.recency * recency
            + w.usage * usage;

        ScoreBreakdown {
            semantic,
            recency,
            importance,
            usage,
            final_score: unit(final_score),
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
