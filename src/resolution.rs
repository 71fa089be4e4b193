//! Resolution records.
//!
//! A Resolution references exactly one [`Conflict`](crate::Conflict) by id and
//! records the outcome of one strategy attempt. Resolutions are append-only:
//! resolving the same conflict again produces a new record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::conflict::ConflictId;
use crate::error::ValidationError;

/// Unique identifier for a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionId(Uuid);

impl ResolutionId {
    /// Creates a new random resolution ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResolutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strategy used to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Majority vote over canonical payloads.
    Voting,

    /// Highest worker priority wins.
    PriorityBased,

    /// No winner; the work must be redone independently.
    ReEvaluation,

    /// Host-supplied combination of payloads.
    Merge,

    /// Host-supplied human-in-the-loop handling.
    Escalate,
}

impl ResolutionStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Voting,
        Self::PriorityBased,
        Self::ReEvaluation,
        Self::Merge,
        Self::Escalate,
    ];

    /// Returns true if the engine ships an algorithm for this strategy.
    #[must_use]
    pub const fn is_builtin(self) -> bool {
        matches!(self, Self::Voting | Self::PriorityBased | Self::ReEvaluation)
    }

    /// Returns a short stable identifier suitable for logging/debugging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Voting => "voting",
            Self::PriorityBased => "priority_based",
            Self::ReEvaluation => "re_evaluation",
            Self::Merge => "merge",
            Self::Escalate => "escalate",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == normalized)
            .ok_or_else(|| ValidationError::InvalidStrategy {
                value: s.to_string(),
            })
    }
}

/// What a strategy handler decided, before it is stamped into a [`Resolution`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionOutcome {
    /// Winning payload, if a winner was chosen.
    pub winning_payload: Option<Value>,
    /// Worker whose payload won.
    pub winning_worker: Option<String>,
    /// Certainty in the outcome. Clamped to `[0, 1]` when stamped.
    pub confidence: f64,
    /// A human or higher authority must decide.
    pub requires_escalation: bool,
    /// The work must be redone independently.
    pub requires_re_evaluation: bool,
    /// Strategy-specific details.
    pub metadata: Map<String, Value>,
}

impl ResolutionOutcome {
    /// An outcome with a winner.
    #[must_use]
    pub fn winner(worker_id: impl Into<String>, payload: Value, confidence: f64) -> Self {
        Self {
            winning_payload: Some(payload),
            winning_worker: Some(worker_id.into()),
            confidence,
            ..Self::default()
        }
    }

    /// An outcome that defers to a human or higher authority.
    #[must_use]
    pub fn escalation() -> Self {
        Self {
            requires_escalation: true,
            ..Self::default()
        }
    }

    /// An outcome that asks for an independent redo.
    #[must_use]
    pub fn re_evaluation() -> Self {
        Self {
            requires_re_evaluation: true,
            ..Self::default()
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of resolving one conflict under one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Unique identifier for this resolution.
    pub id: ResolutionId,
    /// The conflict this resolution settles.
    pub conflict_id: ConflictId,
    /// Strategy that produced it.
    pub strategy: ResolutionStrategy,
    /// Winning payload, if any.
    pub winning_payload: Option<Value>,
    /// Worker whose payload won, if any.
    pub winning_worker: Option<String>,
    /// Certainty in `[0, 1]`.
    pub confidence: f64,
    /// A human or higher authority must decide.
    pub requires_escalation: bool,
    /// The work must be redone independently.
    pub requires_re_evaluation: bool,
    /// Strategy-specific details.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// When the resolution was produced.
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    /// Stamps an outcome with ids and a timestamp.
    ///
    /// Confidence is clamped into `[0, 1]`; a NaN confidence becomes `0.0`.
    #[must_use]
    pub fn from_outcome(
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        outcome: ResolutionOutcome,
    ) -> Self {
        let confidence = if outcome.confidence.is_nan() {
            0.0
        } else {
            outcome.confidence.clamp(0.0, 1.0)
        };

        Self {
            id: ResolutionId::new(),
            conflict_id,
            strategy,
            winning_payload: outcome.winning_payload,
            winning_worker: outcome.winning_worker,
            confidence,
            requires_escalation: outcome.requires_escalation,
            requires_re_evaluation: outcome.requires_re_evaluation,
            metadata: outcome.metadata,
            resolved_at: Utc::now(),
        }
    }

    /// Returns true if a winner was chosen without escalation or redo.
    #[must_use]
    pub fn is_decisive(&self) -> bool {
        self.winning_worker.is_some() && !self.requires_escalation && !self.requires_re_evaluation
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("voting".parse::<ResolutionStrategy>().unwrap(), ResolutionStrategy::Voting);
        assert_eq!(
            "Priority-Based".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::PriorityBased
        );
        assert_eq!(
            " re_evaluation ".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::ReEvaluation
        );
    }

    #[test]
    fn test_strategy_parse_rejects_unknown() {
        let err = "not-a-strategy".parse::<ResolutionStrategy>().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidStrategy { ref value } if value == "not-a-strategy"
        ));
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in ResolutionStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<ResolutionStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_builtin_split() {
        assert!(ResolutionStrategy::Voting.is_builtin());
        assert!(!ResolutionStrategy::Merge.is_builtin());
        assert!(!ResolutionStrategy::Escalate.is_builtin());
    }

    #[test]
    fn test_confidence_clamped() {
        let id = ConflictId::new();
        let high = Resolution::from_outcome(
            id,
            ResolutionStrategy::Merge,
            ResolutionOutcome::winner("a", json!("X"), 1.7),
        );
        assert!((high.confidence - 1.0).abs() < f64::EPSILON);

        let nan = Resolution::from_outcome(
            id,
            ResolutionStrategy::Merge,
            ResolutionOutcome {
                confidence: f64::NAN,
                ..ResolutionOutcome::default()
            },
        );
        assert!(nan.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_decisive() {
        let id = ConflictId::new();
        let win = Resolution::from_outcome(
            id,
            ResolutionStrategy::Voting,
            ResolutionOutcome::winner("a", json!("X"), 0.9),
        );
        assert!(win.is_decisive());

        let redo = Resolution::from_outcome(
            id,
            ResolutionStrategy::ReEvaluation,
            ResolutionOutcome::re_evaluation(),
        );
        assert!(!redo.is_decisive());
    }

    #[test]
    fn test_resolution_serialization() {
        let resolution = Resolution::from_outcome(
            ConflictId::new(),
            ResolutionStrategy::PriorityBased,
            ResolutionOutcome::winner("a", json!("X"), 0.75).with_metadata("winning_priority", 10),
        );
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["strategy"], "priority_based");
        assert_eq!(json["metadata"]["winning_priority"], 10);

        let back: Resolution = serde_json::from_value(json).unwrap();
        assert_eq!(back, resolution);
    }
}
