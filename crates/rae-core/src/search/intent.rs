//! Query intent classification by pattern scoring.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Factual,
    Conceptual,
    Relational,
    Temporal,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 4] = [
        IntentCategory::Factual,
        IntentCategory::Conceptual,
        IntentCategory::Relational,
        IntentCategory::Temporal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Factual => "factual",
            IntentCategory::Conceptual => "conceptual",
            IntentCategory::Relational => "relational",
            IntentCategory::Temporal => "temporal",
        }
    }

    /// Builtin weight profile suited to this intent.
    pub fn profile_name(&self) -> &'static str {
        match self {
            IntentCategory::Factual | IntentCategory::Temporal => "factual",
            IntentCategory::Conceptual => "conceptual",
            IntentCategory::Relational => "relational",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub category: IntentCategory,
    /// In [0, 1]; 0 when no pattern matched
    pub confidence: f64,
    /// Raw signal per category
    pub signals: BTreeMap<IntentCategory, f64>,
}

impl QueryIntent {
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

struct PatternSignal {
    category: IntentCategory,
    pattern: Regex,
    weight: f64,
}

const BUILTIN_PATTERNS: &[(IntentCategory, &str, f64)] = &[
    (
        IntentCategory::Factual,
        r"\b(what|who|which|where)\s+(is|are|was|were)\b",
        1.0,
    ),
    (
        IntentCategory::Factual,
        r"\b(define|definition of|name of|how many|how much|specific)\b",
        0.8,
    ),
    (
        IntentCategory::Conceptual,
        r"\b(explain|understand|concept|principle|overview|meaning|idea behind)\b",
        0.8,
    ),
    (IntentCategory::Conceptual, r"\bwhy\b", 0.6),
    (IntentCategory::Conceptual, r"\bhow\s+does\b.*\bwork\b", 1.0),
    (
        IntentCategory::Relational,
        r"\b(relate[sd]?|relationship|relation|connect(s|ed|ion)?|linked|depends?|dependency|associated)\b",
        0.8,
    ),
    (IntentCategory::Relational, r"\bbetween\b", 0.6),
    (
        IntentCategory::Relational,
        r"\bhow\s+(is|are|does|do)\b.*\b(related|connected|linked|relate|connect)\b",
        1.0,
    ),
    (
        IntentCategory::Temporal,
        r"\b(recent(ly)?|latest|yesterday|today|ago|since|timeline|history)\b",
        0.8,
    ),
    (
        IntentCategory::Temporal,
        r"\b(last|past|previous)\s+(hour|day|week|month|quarter|year)s?\b",
        1.0,
    ),
    (IntentCategory::Temporal, r"\bwhen\s+(did|was|were)\b", 0.8),
    (IntentCategory::Temporal, r"\b(19|20)\d{2}\b", 0.5),
];

/// Scores a query against weighted patterns per intent category.
///
/// Each pattern contributes its weight at most once. The winning category
/// is the one with the largest raw signal (ties resolved in
/// [`IntentCategory::ALL`] order). Confidence is `min(1, best) · best / total`,
/// so a weak match or a close runner-up both lower it.
pub struct QueryAnalyzer {
    patterns: Vec<PatternSignal>,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryAnalyzer {
    pub fn new() -> Self {
        let patterns = BUILTIN_PATTERNS
            .iter()
            .filter_map(|(category, pattern, weight)| {
                Regex::new(pattern).ok().map(|pattern| PatternSignal {
                    category: *category,
                    pattern,
                    weight: *weight,
                })
            })
            .collect();
        Self { patterns }
    }

    /// Add a pattern. Matching is against the lowercased query.
    pub fn with_pattern(
        mut self,
        category: IntentCategory,
        pattern: &str,
        weight: f64,
    ) -> Result<Self, ValidationError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(ValidationError::InvalidConfig(format!(
                "pattern weight must be positive, got {weight}"
            )));
        }
        let pattern = Regex::new(pattern)
            .map_err(|e| ValidationError::InvalidConfig(format!("invalid intent pattern: {e}")))?;
        self.patterns.push(PatternSignal {
            category,
            pattern,
            weight,
        });
        Ok(self)
    }

    pub fn classify(&self, query: &str) -> QueryIntent {
        let text = query.to_lowercase();
        let mut signals: BTreeMap<IntentCategory, f64> =
            IntentCategory::ALL.iter().map(|c| (*c, 0.0)).collect();
        for signal in &self.patterns {
            if signal.pattern.is_match(&text) {
                *signals.entry(signal.category).or_insert(0.0) += signal.weight;
            }
        }

        let total: f64 = signals.values().sum();
        let (category, best) = IntentCategory::ALL
            .iter()
            .map(|c| (*c, signals.get(c).copied().unwrap_or(0.0)))
            .fold((IntentCategory::Factual, 0.0), |acc, (c, s)| {
                if s > acc.1 {
                    (c, s)
                } else {
                    acc
                }
            });
        let confidence = if total > 0.0 {
            (best.min(1.0) * best / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        QueryIntent {
            category,
            confidence,
            signals,
        }
    }
}
