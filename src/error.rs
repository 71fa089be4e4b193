//! Error types for Concord.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Malformed reports are never errors: they are skipped
//! by the detector.

use thiserror::Error;

use crate::resolution::ResolutionStrategy;

/// Validation errors that occur during input or configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Unrecognized resolution strategy '{value}'")]
    InvalidStrategy {
        value: String,
    },

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f64,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Strategy '{strategy}' is built in and cannot be replaced by a handler")]
    BuiltinStrategy {
        strategy: ResolutionStrategy,
    },

    #[error("Invalid conflict record: {reason}")]
    InvalidConflict {
        reason: String,
    },
}

/// Errors raised while a strategy handler computes a resolution.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Handler for '{strategy}' failed: {reason}")]
    HandlerFailed {
        strategy: ResolutionStrategy,
        reason: String,
    },
}

/// Top-level error type for Concord.
#[derive(Debug, Error)]
pub enum ConcordError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ConcordError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid-strategy validation error.
    #[must_use]
    pub fn invalid_strategy(value: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidStrategy {
            value: value.into(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this error reports an unrecognized strategy.
    #[must_use]
    pub const fn is_invalid_strategy(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::InvalidStrategy { .. })
        )
    }

    /// Returns true if a strategy handler failed.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for Concord operations.
pub type ConcordResult<T> = Result<T, ConcordError>;
