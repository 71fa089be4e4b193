//! The conflict engine.
//!
//! [`ConflictEngine`] is an explicitly constructed, caller-owned instance that
//! ties detection, resolution and the ledger together. Hosts share it by
//! reference or `Arc`; every method takes `&self`.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::canonical::{Canonicalizer, DisplayCanonicalizer};
use crate::config::EngineConfig;
use crate::conflict::{Conflict, ConflictKind};
use crate::detector::ConflictSetBuilder;
use crate::error::{ConcordError, ConcordResult};
use crate::ledger::{Ledger, LedgerSummary};
use crate::report::ReportBatch;
use crate::resolution::{Resolution, ResolutionStrategy};
use crate::resolver::{apply_strategy, HandlerRegistry, Priorities, ResolveContext, StrategyHandler};

/// Conflict detection and resolution engine.
pub struct ConflictEngine {
    config: EngineConfig,
    canonicalizer: Arc<dyn Canonicalizer>,
    handlers: RwLock<HandlerRegistry>,
    ledger: Ledger,
}

impl Default for ConflictEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictEngine {
    /// Create an engine with the default configuration and canonicalizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            canonicalizer: Arc::new(DisplayCanonicalizer),
            handlers: RwLock::new(HandlerRegistry::new()),
            ledger: Ledger::new(),
        }
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(config: EngineConfig) -> ConcordResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Replace the canonicalizer used to compare payloads.
    #[must_use]
    pub fn with_canonicalizer(mut self, canonicalizer: impl Canonicalizer + 'static) -> Self {
        self.canonicalizer = Arc::new(canonicalizer);
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying ledger, for audit queries.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Register a handler for MERGE or ESCALATE.
    pub fn register_handler(
        &self,
        strategy: ResolutionStrategy,
        handler: impl StrategyHandler + 'static,
    ) -> ConcordResult<()> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ConcordError::internal("handler registry lock poisoned"))?;
        handlers.register(strategy, Arc::new(handler))?;
        debug!(strategy = %strategy, "strategy handler registered");
        Ok(())
    }

    /// Detect conflicts of `kind` in `reports` and record them.
    ///
    /// Reports without a work unit are skipped. An empty result is normal.
    pub fn detect(&self, reports: &ReportBatch, kind: ConflictKind) -> ConcordResult<Vec<Conflict>> {
        let conflicts = ConflictSetBuilder::new(self.canonicalizer.as_ref())
            .with_severity(self.config.default_severity)
            .build(reports, kind);

        self.ledger.record_conflicts(&conflicts)?;
        debug!(
            kind = %kind,
            reports = reports.len(),
            conflicts = conflicts.len(),
            "detection finished"
        );
        Ok(conflicts)
    }

    /// Run [`detect`](Self::detect) for each kind in order.
    pub fn detect_all(
        &self,
        reports: &ReportBatch,
        kinds: &[ConflictKind],
    ) -> ConcordResult<Vec<Conflict>> {
        let mut all = Vec::new();
        for &kind in kinds {
            all.extend(self.detect(reports, kind)?);
        }
        Ok(all)
    }

    /// Record a conflict the host detected itself.
    pub fn record_conflict(&self, conflict: &Conflict) -> ConcordResult<()> {
        self.ledger.record_conflicts(std::slice::from_ref(conflict))
    }

    /// Resolve `conflict` under `strategy` and record the resolution.
    ///
    /// `priorities` is only consulted by PRIORITY_BASED; its absence means
    /// every worker has the configured default priority.
    pub fn resolve(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        priorities: Option<&Priorities>,
    ) -> ConcordResult<Resolution> {
        let handler = if strategy.is_builtin() {
            None
        } else {
            self.handlers
                .read()
                .map_err(|_| ConcordError::internal("handler registry lock poisoned"))?
                .get(strategy)
        };

        let ctx = ResolveContext {
            canonicalizer: self.canonicalizer.as_ref(),
            priorities,
            config: &self.config,
        };
        let outcome = apply_strategy(strategy, conflict, &ctx, handler.as_deref())?;
        let resolution = Resolution::from_outcome(conflict.id(), strategy, outcome);

        if resolution.requires_escalation {
            warn!(
                conflict_id = %conflict.id(),
                strategy = %strategy,
                confidence = resolution.confidence,
                "conflict requires escalation"
            );
        }
        info!(
            conflict_id = %conflict.id(),
            work_unit_id = conflict.work_unit_id(),
            strategy = %strategy,
            winning_worker = resolution.winning_worker.as_deref().unwrap_or("-"),
            confidence = resolution.confidence,
            requires_escalation = resolution.requires_escalation,
            requires_re_evaluation = resolution.requires_re_evaluation,
            "conflict resolved"
        );

        self.ledger.record_resolution(conflict, resolution)
    }

    /// Resolve with a strategy given by name.
    ///
    /// An unrecognized name fails with an invalid-strategy error before
    /// anything is computed or recorded.
    pub fn resolve_named(
        &self,
        conflict: &Conflict,
        strategy: &str,
        priorities: Option<&Priorities>,
    ) -> ConcordResult<Resolution> {
        let parsed = strategy.parse::<ResolutionStrategy>().map_err(|e| {
            warn!(strategy, "rejected unknown resolution strategy");
            ConcordError::from(e)
        })?;
        self.resolve(conflict, parsed, priorities)
    }

    /// Counts over everything recorded so far.
    pub fn summary(&self) -> ConcordResult<LedgerSummary> {
        self.ledger.summary()
    }

    /// Clear the ledger. Registered handlers are kept.
    pub fn reset(&self) -> ConcordResult<()> {
        self.ledger.reset()
    }
}
