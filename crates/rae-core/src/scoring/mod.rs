//! Multi-factor relevance scoring and importance decay.
//!
//! `ScoreEngine` is a pure function of its inputs: it holds only immutable
//! configuration and can be shared across threads without locking.

pub mod decay;
pub mod engine;
pub mod importance;

pub use decay::{DecayReport, DecayTask, PeriodicTask};
pub use engine::{ScoreBreakdown, ScoreCandidate, ScoreEngine, ScoreWeights};
pub use importance::{recompute_importance, ImportanceDecayPolicy};
