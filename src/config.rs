//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::conflict::Severity;
use crate::error::ValidationError;

/// Tunables for detection and the built-in resolution strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence reported by VOTING when no strict majority exists.
    pub escalation_confidence: f64,
    /// PRIORITY_BASED confidence when the top two priorities are equal.
    pub priority_base_confidence: f64,
    /// Upper bound on PRIORITY_BASED confidence with two or more workers.
    pub priority_confidence_cap: f64,
    /// Priority gap that adds 1.0 to the base confidence.
    pub priority_gap_divisor: f64,
    /// Priority assumed for workers missing from the priority map.
    pub default_priority: i64,
    /// Severity assigned to detected conflicts.
    pub default_severity: Severity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escalation_confidence: 0.4,
            priority_base_confidence: 0.5,
            priority_confidence_cap: 0.9,
            priority_gap_divisor: 20.0,
            default_priority: 0,
            default_severity: Severity::Medium,
        }
    }
}

impl EngineConfig {
    fn check_unit(field: &str, value: f64) -> Result<(), ValidationError> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(ValidationError::InvalidConfig {
                field: field.to_string(),
                reason: format!("must be within [0.0, 1.0] (got {value})"),
            })
        }
    }

    /// Validates the configuration, returning it unchanged on success.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Self::check_unit("escalation_confidence", self.escalation_confidence)?;
        Self::check_unit("priority_base_confidence", self.priority_base_confidence)?;
        Self::check_unit("priority_confidence_cap", self.priority_confidence_cap)?;

        if !(self.priority_gap_divisor.is_finite() && self.priority_gap_divisor > 0.0) {
            return Err(ValidationError::InvalidConfig {
                field: "priority_gap_divisor".to_string(),
                reason: format!("must be finite and positive (got {})", self.priority_gap_divisor),
            });
        }

        if self.priority_base_confidence > self.priority_confidence_cap {
            return Err(ValidationError::InvalidConfig {
                field: "priority_base_confidence".to_string(),
                reason: format!(
                    "must not exceed priority_confidence_cap ({} > {})",
                    self.priority_base_confidence, self.priority_confidence_cap
                ),
            });
        }

        Ok(self)
    }
}
