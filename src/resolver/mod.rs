//! Resolution strategies and their dispatch.
//!
//! Strategies are a closed enum. VOTING, PRIORITY_BASED and RE_EVALUATION are
//! built in; MERGE and ESCALATE go through a [`HandlerRegistry`] so hosts can
//! plug in their own logic without touching the dispatch below.
//!
//! Everything here is pure (no I/O, no shared state) so a resolution can be
//! reproduced given the same conflict, priorities and configuration.

mod strategies;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::canonical::Canonicalizer;
use crate::config::EngineConfig;
use crate::conflict::Conflict;
use crate::error::{ResolutionError, ValidationError};
use crate::resolution::{ResolutionOutcome, ResolutionStrategy};

pub use strategies::{re_evaluate, resolve_by_priority, resolve_by_vote};

/// Worker priorities for PRIORITY_BASED resolution.
pub type Priorities = BTreeMap<String, i64>;

/// Inputs shared by every strategy.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Key function used to compare payloads.
    pub canonicalizer: &'a dyn Canonicalizer,
    /// Caller-supplied priorities, if any.
    pub priorities: Option<&'a Priorities>,
    /// Engine tunables.
    pub config: &'a EngineConfig,
}

/// Host-supplied resolution logic for an extension strategy.
pub trait StrategyHandler: Send + Sync {
    /// Computes the outcome for `conflict`.
    fn resolve(
        &self,
        conflict: &Conflict,
        ctx: &ResolveContext<'_>,
    ) -> Result<ResolutionOutcome, ResolutionError>;
}

impl<F> StrategyHandler for F
where
    F: Fn(&Conflict, &ResolveContext<'_>) -> Result<ResolutionOutcome, ResolutionError>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        conflict: &Conflict,
        ctx: &ResolveContext<'_>,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        self(conflict, ctx)
    }
}

/// Handlers registered for MERGE and ESCALATE.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ResolutionStrategy, Arc<dyn StrategyHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `strategy`, replacing any previous handler.
    ///
    /// Built-in strategies cannot be overridden.
    pub fn register(
        &mut self,
        strategy: ResolutionStrategy,
        handler: Arc<dyn StrategyHandler>,
    ) -> Result<(), ValidationError> {
        if strategy.is_builtin() {
            return Err(ValidationError::BuiltinStrategy { strategy });
        }
        self.handlers.insert(strategy, handler);
        Ok(())
    }

    /// Removes the handler for `strategy`, returning true if one existed.
    pub fn unregister(&mut self, strategy: ResolutionStrategy) -> bool {
        self.handlers.remove(&strategy).is_some()
    }

    /// Returns the handler for `strategy`.
    #[must_use]
    pub fn get(&self, strategy: ResolutionStrategy) -> Option<Arc<dyn StrategyHandler>> {
        self.handlers.get(&strategy).cloned()
    }

    /// Returns true if a handler is registered for `strategy`.
    #[must_use]
    pub fn contains(&self, strategy: ResolutionStrategy) -> bool {
        self.handlers.contains_key(&strategy)
    }
}

/// Outcome for an extension strategy nobody registered a handler for.
fn unhandled(strategy: ResolutionStrategy) -> ResolutionOutcome {
    ResolutionOutcome::escalation()
        .with_metadata("handler", "unregistered")
        .with_metadata("requested_strategy", strategy.name())
}

/// Apply `strategy` to `conflict`.
///
/// `handler` is consulted only for extension strategies; callers look it up
/// from their [`HandlerRegistry`] beforehand so no lock is held while host
/// code runs.
pub fn apply_strategy(
    strategy: ResolutionStrategy,
    conflict: &Conflict,
    ctx: &ResolveContext<'_>,
    handler: Option<&dyn StrategyHandler>,
) -> Result<ResolutionOutcome, ResolutionError> {
    match strategy {
        ResolutionStrategy::Voting => Ok(resolve_by_vote(conflict, ctx)),
        ResolutionStrategy::PriorityBased => Ok(resolve_by_priority(conflict, ctx)),
        ResolutionStrategy::ReEvaluation => Ok(re_evaluate(conflict)),
        ResolutionStrategy::Merge | ResolutionStrategy::Escalate => match handler {
            Some(handler) => handler.resolve(conflict, ctx),
            None => Ok(unhandled(strategy)),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::canonical::DisplayCanonicalizer;
    use crate::conflict::ConflictKind;

    fn escalate_always(
        _: &Conflict,
        _: &ResolveContext<'_>,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        Ok(ResolutionOutcome::escalation())
    }

    fn join_strings(
        conflict: &Conflict,
        _: &ResolveContext<'_>,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        let joined: Vec<String> = conflict
            .payloads()
            .filter_map(|(_, p)| p.as_str().map(str::to_string))
            .collect();
        Ok(ResolutionOutcome {
            winning_payload: Some(json!(joined.join("+"))),
            confidence: 0.8,
            ..ResolutionOutcome::default()
        })
    }

    fn conflict() -> Conflict {
        Conflict::new(
            ConflictKind::OutputMismatch,
            "u1",
            vec![("a", json!("X")), ("b", json!("Y"))],
        )
    }

    #[test]
    fn registry_rejects_builtin_strategies() {
        let mut registry = HandlerRegistry::new();
        let handler: Arc<dyn StrategyHandler> = Arc::new(escalate_always);
        let err = registry
            .register(ResolutionStrategy::Voting, Arc::clone(&handler))
            .unwrap_err();
        assert!(matches!(err, ValidationError::BuiltinStrategy { .. }));

        registry.register(ResolutionStrategy::Merge, handler).unwrap();
        assert!(registry.contains(ResolutionStrategy::Merge));
        assert!(registry.unregister(ResolutionStrategy::Merge));
        assert!(!registry.contains(ResolutionStrategy::Merge));
    }

    #[test]
    fn unhandled_extension_escalates() {
        let config = EngineConfig::default();
        let ctx = ResolveContext {
            canonicalizer: &DisplayCanonicalizer,
            priorities: None,
            config: &config,
        };
        let outcome = apply_strategy(ResolutionStrategy::Merge, &conflict(), &ctx, None).unwrap();
        assert!(outcome.requires_escalation);
        assert!(outcome.winning_worker.is_none());
        assert_eq!(outcome.metadata["handler"], "unregistered");
    }

    #[test]
    fn registered_handler_is_dispatched() {
        let config = EngineConfig::default();
        let ctx = ResolveContext {
            canonicalizer: &DisplayCanonicalizer,
            priorities: None,
            config: &config,
        };
        let outcome = apply_strategy(
            ResolutionStrategy::Merge,
            &conflict(),
            &ctx,
            Some(&join_strings),
        )
        .unwrap();
        assert_eq!(outcome.winning_payload, Some(json!("X+Y")));
    }
}
