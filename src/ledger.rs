//! Append-only conflict and resolution history.
//!
//! The ledger is the only shared mutable state in the engine. Appends are
//! serialized behind a single lock so concurrent detection and resolution
//! never interleave a partial write. Reads return clones.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::{Conflict, ConflictId, ConflictKind};
use crate::error::{ConcordError, ConcordResult};
use crate::resolution::{Resolution, ResolutionStrategy};

fn lock_err(context: &'static str) -> ConcordError {
    ConcordError::internal(format!("poisoned lock: {context}"))
}

/// Aggregate counts over the full ledger history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Number of recorded conflicts.
    pub total_conflicts: usize,
    /// Number of recorded resolutions.
    pub total_resolutions: usize,
    /// Conflicts per kind. Kinds with no conflicts are absent.
    pub conflicts_by_kind: BTreeMap<ConflictKind, usize>,
    /// Resolutions per strategy. Strategies never used are absent.
    pub resolutions_by_strategy: BTreeMap<ResolutionStrategy, usize>,
}

#[derive(Debug, Default)]
struct LedgerState {
    conflicts: Vec<Conflict>,
    by_id: HashMap<ConflictId, usize>,
    resolutions: Vec<Resolution>,
}

impl LedgerState {
    fn push_conflict(&mut self, conflict: Conflict) -> bool {
        if self.by_id.contains_key(&conflict.id()) {
            return false;
        }
        self.by_id.insert(conflict.id(), self.conflicts.len());
        self.conflicts.push(conflict);
        true
    }
}

/// Thread-safe, process-scoped ledger.
#[derive(Debug, Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends conflicts in order. Conflicts already present are skipped.
    pub fn record_conflicts(&self, conflicts: &[Conflict]) -> ConcordResult<()> {
        if conflicts.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().map_err(|_| lock_err("ledger.record_conflicts"))?;
        for conflict in conflicts {
            if state.push_conflict(conflict.clone()) {
                debug!(conflict_id = %conflict.id(), kind = %conflict.kind(), "conflict recorded");
            }
        }
        Ok(())
    }

    /// Appends a resolution for `conflict`.
    ///
    /// If the conflict is not in the ledger yet it is recorded first, within
    /// the same critical section, so every resolution refers to a recorded
    /// conflict.
    pub fn record_resolution(
        &self,
        conflict: &Conflict,
        resolution: Resolution,
    ) -> ConcordResult<Resolution> {
        if resolution.conflict_id != conflict.id() {
            return Err(ConcordError::internal(format!(
                "resolution {} references conflict {}, expected {}",
                resolution.id,
                resolution.conflict_id,
                conflict.id()
            )));
        }

        let mut state = self.state.write().map_err(|_| lock_err("ledger.record_resolution"))?;
        if state.push_conflict(conflict.clone()) {
            debug!(conflict_id = %conflict.id(), "adopted unrecorded conflict");
        }
        state.resolutions.push(resolution.clone());
        debug!(
            resolution_id = %resolution.id,
            conflict_id = %resolution.conflict_id,
            strategy = %resolution.strategy,
            "resolution recorded"
        );
        Ok(resolution)
    }

    /// Returns true if a conflict with `id` has been recorded.
    pub fn contains(&self, id: ConflictId) -> ConcordResult<bool> {
        let state = self.state.read().map_err(|_| lock_err("ledger.contains"))?;
        Ok(state.by_id.contains_key(&id))
    }

    /// Returns the conflict with `id`.
    pub fn conflict(&self, id: ConflictId) -> ConcordResult<Option<Conflict>> {
        let state = self.state.read().map_err(|_| lock_err("ledger.conflict"))?;
        Ok(state.by_id.get(&id).map(|&idx| state.conflicts[idx].clone()))
    }

    /// All conflicts in recording order.
    pub fn conflicts(&self) -> ConcordResult<Vec<Conflict>> {
        let state = self.state.read().map_err(|_| lock_err("ledger.conflicts"))?;
        Ok(state.conflicts.clone())
    }

    /// All resolutions in recording order.
    pub fn resolutions(&self) -> ConcordResult<Vec<Resolution>> {
        let state = self.state.read().map_err(|_| lock_err("ledger.resolutions"))?;
        Ok(state.resolutions.clone())
    }

    /// Resolutions for one conflict, oldest first.
    pub fn resolutions_for(&self, id: ConflictId) -> ConcordResult<Vec<Resolution>> {
        let state = self.state.read().map_err(|_| lock_err("ledger.resolutions_for"))?;
        Ok(state
            .resolutions
            .iter()
            .filter(|r| r.conflict_id == id)
            .cloned()
            .collect())
    }

    /// Most recent resolution for one conflict.
    pub fn latest_resolution(&self, id: ConflictId) -> ConcordResult<Option<Resolution>> {
        let state = self.state.read().map_err(|_| lock_err("ledger.latest_resolution"))?;
        Ok(state
            .resolutions
            .iter()
            .rev()
            .find(|r| r.conflict_id == id)
            .cloned())
    }

    /// Conflicts recorded for a work unit.
    pub fn conflicts_for_work_unit(&self, work_unit_id: &str) -> ConcordResult<Vec<Conflict>> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("ledger.conflicts_for_work_unit"))?;
        Ok(state
            .conflicts
            .iter()
            .filter(|c| c.work_unit_id() == work_unit_id)
            .cloned()
            .collect())
    }

    /// Conflicts that have no resolution yet.
    pub fn unresolved_conflicts(&self) -> ConcordResult<Vec<Conflict>> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("ledger.unresolved_conflicts"))?;
        let resolved: HashSet<ConflictId> =
            state.resolutions.iter().map(|r| r.conflict_id).collect();
        Ok(state
            .conflicts
            .iter()
            .filter(|c| !resolved.contains(&c.id()))
            .cloned()
            .collect())
    }

    /// Counts over the full history, computed fresh on every call.
    pub fn summary(&self) -> ConcordResult<LedgerSummary> {
        let state = self.state.read().map_err(|_| lock_err("ledger.summary"))?;

        let mut summary = LedgerSummary {
            total_conflicts: state.conflicts.len(),
            total_resolutions: state.resolutions.len(),
            ..LedgerSummary::default()
        };
        for conflict in &state.conflicts {
            *summary.conflicts_by_kind.entry(conflict.kind()).or_default() += 1;
        }
        for resolution in &state.resolutions {
            *summary
                .resolutions_by_strategy
                .entry(resolution.strategy)
                .or_default() += 1;
        }
        Ok(summary)
    }

    /// Clears all history.
    pub fn reset(&self) -> ConcordResult<()> {
        let mut state = self.state.write().map_err(|_| lock_err("ledger.reset"))?;
        *state = LedgerState::default();
        debug!("ledger reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::resolution::ResolutionOutcome;

    fn conflict(kind: ConflictKind, unit: &str) -> Conflict {
        Conflict::new(kind, unit, vec![("a", json!("X")), ("b", json!("Y"))])
    }

    fn resolution(c: &Conflict, strategy: ResolutionStrategy) -> Resolution {
        Resolution::from_outcome(c.id(), strategy, ResolutionOutcome::escalation())
    }

    #[test]
    fn summary_counts_by_kind_and_strategy() {
        let ledger = Ledger::new();
        let c1 = conflict(ConflictKind::OutputMismatch, "u1");
        let c2 = conflict(ConflictKind::OutputMismatch, "u2");
        let c3 = conflict(ConflictKind::DependencyMismatch, "u3");
        ledger.record_conflicts(&[c1.clone(), c2, c3]).unwrap();
        ledger
            .record_resolution(&c1, resolution(&c1, ResolutionStrategy::Voting))
            .unwrap();
        ledger
            .record_resolution(&c1, resolution(&c1, ResolutionStrategy::ReEvaluation))
            .unwrap();

        let summary = ledger.summary().unwrap();
        assert_eq!(summary.total_conflicts, 3);
        assert_eq!(summary.total_resolutions, 2);
        assert_eq!(summary.conflicts_by_kind[&ConflictKind::OutputMismatch], 2);
        assert_eq!(summary.conflicts_by_kind[&ConflictKind::DependencyMismatch], 1);
        assert_eq!(summary.resolutions_by_strategy[&ResolutionStrategy::Voting], 1);
        assert!(!summary
            .resolutions_by_strategy
            .contains_key(&ResolutionStrategy::Merge));
    }

    #[test]
    fn summary_is_idempotent() {
        let ledger = Ledger::new();
        ledger
            .record_conflicts(&[conflict(ConflictKind::StateMismatch, "u1")])
            .unwrap();
        assert_eq!(ledger.summary().unwrap(), ledger.summary().unwrap());
    }

    #[test]
    fn recording_same_conflict_twice_is_noop() {
        let ledger = Ledger::new();
        let c = conflict(ConflictKind::OutputMismatch, "u1");
        ledger.record_conflicts(&[c.clone()]).unwrap();
        ledger.record_conflicts(&[c.clone()]).unwrap();
        assert_eq!(ledger.conflicts().unwrap().len(), 1);
    }

    #[test]
    fn resolution_adopts_unrecorded_conflict() {
        let ledger = Ledger::new();
        let c = conflict(ConflictKind::ResourceConflict, "u1");
        ledger
            .record_resolution(&c, resolution(&c, ResolutionStrategy::Escalate))
            .unwrap();

        assert!(ledger.contains(c.id()).unwrap());
        assert_eq!(ledger.conflict(c.id()).unwrap().unwrap().work_unit_id(), "u1");
    }

    #[test]
    fn mismatched_resolution_is_rejected() {
        let ledger = Ledger::new();
        let c = conflict(ConflictKind::OutputMismatch, "u1");
        let other = conflict(ConflictKind::OutputMismatch, "u2");
        let err = ledger
            .record_resolution(&c, resolution(&other, ResolutionStrategy::Voting))
            .unwrap_err();

        assert!(err.is_internal());
        assert_eq!(ledger.summary().unwrap(), LedgerSummary::default());
    }

    #[test]
    fn history_queries() {
        let ledger = Ledger::new();
        let c1 = conflict(ConflictKind::OutputMismatch, "u1");
        let c2 = conflict(ConflictKind::InterpretationMismatch, "u1");
        ledger.record_conflicts(&[c1.clone(), c2.clone()]).unwrap();

        let first = ledger
            .record_resolution(&c1, resolution(&c1, ResolutionStrategy::Voting))
            .unwrap();
        let second = ledger
            .record_resolution(&c1, resolution(&c1, ResolutionStrategy::PriorityBased))
            .unwrap();

        let history = ledger.resolutions_for(c1.id()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(ledger.latest_resolution(c1.id()).unwrap().unwrap().id, second.id);
        assert!(ledger.latest_resolution(c2.id()).unwrap().is_none());

        assert_eq!(ledger.conflicts_for_work_unit("u1").unwrap().len(), 2);
        let unresolved = ledger.unresolved_conflicts().unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id(), c2.id());
    }

    #[test]
    fn unresolved_keeps_recording_order_over_many_resolutions() {
        let ledger = Ledger::new();
        let conflicts: Vec<Conflict> = (0..200)
            .map(|i| conflict(ConflictKind::StateMismatch, &format!("u{i}")))
            .collect();
        ledger.record_conflicts(&conflicts).unwrap();
        for c in conflicts.iter().filter(|c| c.work_unit_id().len() % 2 == 0) {
            for strategy in [ResolutionStrategy::Voting, ResolutionStrategy::Escalate] {
                ledger.record_resolution(c, resolution(c, strategy)).unwrap();
            }
        }

        let expected: Vec<ConflictId> = conflicts
            .iter()
            .filter(|c| c.work_unit_id().len() % 2 == 1)
            .map(Conflict::id)
            .collect();
        let unresolved: Vec<ConflictId> = ledger
            .unresolved_conflicts()
            .unwrap()
            .iter()
            .map(Conflict::id)
            .collect();
        assert_eq!(unresolved, expected);
    }

    #[test]
    fn reset_clears_everything() {
        let ledger = Ledger::new();
        let c = conflict(ConflictKind::OutputMismatch, "u1");
        ledger
            .record_resolution(&c, resolution(&c, ResolutionStrategy::Voting))
            .unwrap();
        ledger.reset().unwrap();

        assert_eq!(ledger.summary().unwrap(), LedgerSummary::default());
        assert!(!ledger.contains(c.id()).unwrap());
    }

    #[test]
    fn summary_serializes_with_snake_case_keys() {
        let ledger = Ledger::new();
        ledger
            .record_conflicts(&[conflict(ConflictKind::OutputMismatch, "u1")])
            .unwrap();
        let json = serde_json::to_value(ledger.summary().unwrap()).unwrap();
        assert_eq!(json["conflicts_by_kind"]["output_mismatch"], 1);
    }
}
