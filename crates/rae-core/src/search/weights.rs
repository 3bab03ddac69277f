//! Named per-strategy weight profiles and their selection.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::intent::QueryIntent;
use super::strategy::StrategyKind;
use crate::domain::{RaeError, RaeResult, ValidationError};

/// Relative weight of each retrieval strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vector: f64,
    /// Full-text strategy
    pub keyword: f64,
    pub semantic: f64,
    pub graph: f64,
}

impl WeightProfile {
    pub fn new(name: impl Into<String>, vector: f64, keyword: f64, semantic: f64, graph: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            vector,
            keyword,
            semantic,
            graph,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn weight(&self, kind: StrategyKind) -> f64 {
        match kind {
            StrategyKind::Vector => self.vector,
            StrategyKind::Keyword => self.keyword,
            StrategyKind::Semantic => self.semantic,
            StrategyKind::Graph => self.graph,
        }
    }

    /// Copy scaled to sum 1.0.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let weights = StrategyKind::ALL.map(|k| self.weight(k));
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ValidationError::InvalidWeights(format!(
                "profile '{}' has a negative or non-finite weight",
                self.name
            )));
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(ValidationError::InvalidWeights(format!(
                "profile '{}' weights sum to zero",
                self.name
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            description: self.description.clone(),
            vector: self.vector / sum,
            keyword: self.keyword / sum,
            semantic: self.semantic / sum,
            graph: self.graph / sum,
        })
    }
}

/// Profiles shipped with the engine.
pub fn builtin_profiles() -> Vec<WeightProfile> {
    vec![
        WeightProfile::new("balanced", 0.35, 0.20, 0.25, 0.20)
            .with_description("General queries and exploratory search"),
        WeightProfile::new("factual", 0.45, 0.15, 0.30, 0.10)
            .with_description("Specific facts and direct answers"),
        WeightProfile::new("conceptual", 0.20, 0.10, 0.50, 0.20)
            .with_description("Concept exploration"),
        WeightProfile::new("relational", 0.15, 0.10, 0.25, 0.50)
            .with_description("Connections between entities"),
        WeightProfile::new("keyword", 0.30, 0.50, 0.10, 0.10)
            .with_description("Exact term matches"),
        WeightProfile::new("semantic_heavy", 0.40, 0.10, 0.30, 0.20)
            .with_description("Embedding-led retrieval"),
        WeightProfile::new("equal_weighted", 0.25, 0.25, 0.25, 0.25)
            .with_description("Every strategy counts the same"),
    ]
}

/// Runtime registry of named profiles. Builtins cannot be replaced.
pub struct WeightRegistry {
    profiles: RwLock<BTreeMap<String, WeightProfile>>,
}

impl Default for WeightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightRegistry {
    pub fn new() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    fn is_builtin(name: &str) -> bool {
        builtin_profiles().iter().any(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Option<WeightProfile> {
        self.profiles.read().get(name).cloned()
    }

    /// All profiles sorted by name.
    pub fn list(&self) -> Vec<WeightProfile> {
        self.profiles.read().values().cloned().collect()
    }

    /// Add or replace a custom profile. Weights are validated but stored as
    /// given.
    pub fn register(&self, profile: WeightProfile) -> RaeResult<()> {
        if profile.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "name" }.into());
        }
        profile.normalized()?;
        if Self::is_builtin(&profile.name) {
            return Err(RaeError::Conflict(format!(
                "weight profile '{}' is builtin",
                profile.name
            )));
        }
        debug!(event = "weights.registered", profile = %profile.name);
        self.profiles.write().insert(profile.name.clone(), profile);
        Ok(())
    }
}

/// Caller-supplied weights that bypass intent selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightOverride {
    /// A registered profile by name
    Profile(String),
    Custom(WeightProfile),
}

/// How the weights of a search were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    Override,
    Intent,
    Default,
}

/// Pick normalized weights for one search.
///
/// An override always wins. Otherwise a confident intent selects its
/// profile, and anything else falls back to `default_profile`.
pub fn select_weights(
    registry: &WeightRegistry,
    intent: &QueryIntent,
    weight_override: Option<&WeightOverride>,
    confidence_threshold: f64,
    default_profile: &str,
) -> RaeResult<(WeightProfile, WeightSource)> {
    let lookup = |name: &str| {
        registry
            .get(name)
            .ok_or_else(|| RaeError::not_found("weight profile", name))
    };
    let (profile, source) = match weight_override {
        Some(WeightOverride::Profile(name)) => (lookup(name)?, WeightSource::Override),
        Some(WeightOverride::Custom(profile)) => (profile.clone(), WeightSource::Override),
        None if intent.is_confident(confidence_threshold) => {
            (lookup(intent.category.profile_name())?, WeightSource::Intent)
        }
        None => (lookup(default_profile)?, WeightSource::Default),
    };
    Ok((profile.normalized()?, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::intent::{IntentCategory, QueryAnalyzer};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_builtins_sum_to_one() {
        for profile in builtin_profiles() {
            let sum: f64 = StrategyKind::ALL.iter().map(|k| profile.weight(*k)).sum();
            assert!(close(sum, 1.0), "{} sums to {sum}", profile.name);
        }
    }

    #[test]
    fn test_normalization_scales() {
        let p = WeightProfile::new("x", 2.0, 2.0, 0.0, 0.0).normalized().unwrap();
        assert!(close(p.vector, 0.5));
        assert!(close(p.keyword, 0.5));
        assert!(WeightProfile::new("z", 0.0, 0.0, 0.0, 0.0).normalized().is_err());
        assert!(WeightProfile::new("n", -1.0, 1.0, 1.0, 1.0).normalized().is_err());
    }

    #[test]
    fn test_register_and_protect_builtins() {
        let registry = WeightRegistry::new();
        registry
            .register(WeightProfile::new("graph_only", 0.0, 0.0, 0.0, 1.0))
            .unwrap();
        assert!(registry.get("graph_only").is_some());
        assert_eq!(registry.list().len(), builtin_profiles().len() + 1);

        let err = registry
            .register(WeightProfile::new("balanced", 1.0, 0.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, RaeError::Conflict(_)));
        let err = registry
            .register(WeightProfile::new("bad", 0.0, 0.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, RaeError::Validation(_)));
    }

    #[test]
    fn test_selection_order() {
        let registry = WeightRegistry::new();
        let analyzer = QueryAnalyzer::new();

        let weak = analyzer.classify("capital of France");
        let (p, source) = select_weights(&registry, &weak, None, 0.5, "balanced").unwrap();
        assert_eq!((p.name.as_str(), source), ("balanced", WeightSource::Default));

        let relational = analyzer.classify("how are billing and auth connected");
        assert_eq!(relational.category, IntentCategory::Relational);
        let (p, source) = select_weights(&registry, &relational, None, 0.5, "balanced").unwrap();
        assert_eq!((p.name.as_str(), source), ("relational", WeightSource::Intent));

        let custom = WeightOverride::Custom(WeightProfile::new("ab", 1.0, 1.0, 0.0, 0.0));
        let (p, source) =
            select_weights(&registry, &relational, Some(&custom), 0.5, "balanced").unwrap();
        assert_eq!(source, WeightSource::Override);
        assert!(close(p.vector, 0.5));

        let missing = WeightOverride::Profile("nope".to_string());
        let err = select_weights(&registry, &weak, Some(&missing), 0.5, "balanced").unwrap_err();
        assert!(matches!(err, RaeError::NotFound { .. }));
    }
}
