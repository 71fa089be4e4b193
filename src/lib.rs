//! # Concord - conflict detection and resolution for concurrent workers
//!
//! When several autonomous workers independently report on the same unit of
//! work, their outputs, interpretations, or dependency views can diverge.
//! Concord detects that disagreement and arbitrates a single outcome with a
//! quantified confidence.
//!
//! ## Core Concepts
//!
//! - **ReportBatch**: per-worker reports keyed by worker id, in supply order
//! - **Conflict**: an immutable record of workers disagreeing about a work unit
//! - **Resolution**: the outcome of one strategy applied to one conflict
//! - **Ledger**: append-only history of conflicts and resolutions
//! - **ConflictEngine**: the caller-owned instance tying it all together
//!
//! ## Usage
//!
//! ```rust
//! use concord::{ConflictEngine, ConflictKind, ReportBatch, ResolutionStrategy, WorkerReport};
//!
//! let engine = ConflictEngine::new();
//! let reports = ReportBatch::new()
//!     .with("w1", WorkerReport::new("u1", "A"))
//!     .with("w2", WorkerReport::new("u1", "A"))
//!     .with("w3", WorkerReport::new("u1", "B"));
//!
//! let conflicts = engine.detect(&reports, ConflictKind::OutputMismatch)?;
//! let resolution = engine.resolve(&conflicts[0], ResolutionStrategy::Voting, None)?;
//! assert_eq!(resolution.winning_worker.as_deref(), Some("w1"));
//! assert!(!resolution.requires_escalation);
//! # Ok::<(), concord::ConcordError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod canonical;
pub mod config;
pub mod conflict;
pub mod detector;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod report;
pub mod resolution;
pub mod resolver;

// Re-export primary types at crate root for convenience
pub use canonical::{Canonicalizer, DisplayCanonicalizer, NumericCanonicalizer};
pub use config::EngineConfig;
pub use conflict::{Comparison, Conflict, ConflictId, ConflictKind, Severity};
pub use detector::ConflictSetBuilder;
pub use engine::ConflictEngine;
pub use error::{ConcordError, ConcordResult, ResolutionError, ValidationError};
pub use ledger::{Ledger, LedgerSummary};
pub use report::{ReportBatch, WorkerReport};
pub use resolution::{Resolution, ResolutionId, ResolutionOutcome, ResolutionStrategy};
pub use resolver::{HandlerRegistry, Priorities, ResolveContext, StrategyHandler};
