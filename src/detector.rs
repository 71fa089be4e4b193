//! Conflict detection over report batches.
//!
//! The builder groups reports by work unit and compares, within each group,
//! the value every report carries for the kind (see
//! [`WorkerReport::value_for`](crate::WorkerReport::value_for)) according to
//! the kind's [`Comparison`] policy. It is pure: recording the conflicts it
//! finds is the engine's job.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, trace};

use crate::canonical::Canonicalizer;
use crate::conflict::{Comparison, Conflict, ConflictKind, Severity};
use crate::report::ReportBatch;

/// Per-kind values from one work unit, in supply order.
struct Group<'a> {
    work_unit_id: &'a str,
    members: Vec<(&'a str, &'a Value)>,
}

/// Groups reports by work unit, preserving first-seen order of units and
/// supply order within each unit. Reports without a work unit, or without a
/// value for `kind`, are dropped.
fn group_by_work_unit(reports: &ReportBatch, kind: ConflictKind) -> Vec<Group<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for (worker_id, report) in reports.iter() {
        let Some(unit) = report.work_unit() else {
            trace!(worker_id, "skipping report without work unit");
            continue;
        };
        let Some(value) = report.value_for(kind) else {
            trace!(worker_id, kind = %kind, "skipping report without value for kind");
            continue;
        };
        let slot = *index.entry(unit).or_insert_with(|| {
            groups.push(Group {
                work_unit_id: unit,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push((worker_id, value));
    }

    groups
}

/// Extracts the item list a set-compared payload carries.
fn payload_items(kind: ConflictKind, payload: &Value) -> Vec<&Value> {
    match payload {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match kind.items_key().and_then(|key| map.get(key)) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(Value::Null) => Vec::new(),
            Some(single) => vec![single],
            None => vec![payload],
        },
        scalar => vec![scalar],
    }
}

/// Builds conflicts from report batches.
pub struct ConflictSetBuilder<'a> {
    canonicalizer: &'a dyn Canonicalizer,
    severity: Severity,
}

impl<'a> ConflictSetBuilder<'a> {
    /// Creates a builder comparing payloads with `canonicalizer`.
    #[must_use]
    pub fn new(canonicalizer: &'a dyn Canonicalizer) -> Self {
        Self {
            canonicalizer,
            severity: Severity::default(),
        }
    }

    /// Sets the severity assigned to emitted conflicts.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn item_set(&self, kind: ConflictKind, payload: &Value) -> BTreeSet<String> {
        payload_items(kind, payload)
            .into_iter()
            .map(|item| self.canonicalizer.canonical_key(item))
            .collect()
    }

    fn disagrees(&self, kind: ConflictKind, members: &[(&str, &Value)]) -> bool {
        let Some(((_, first), rest)) = members.split_first() else {
            return false;
        };

        match kind.comparison() {
            Comparison::Canonical => {
                let baseline = self.canonicalizer.canonical_key(first);
                rest.iter()
                    .any(|(_, v)| self.canonicalizer.canonical_key(v) != baseline)
            }
            Comparison::UnorderedSet => {
                let baseline = self.item_set(kind, first);
                rest.iter().any(|(_, v)| self.item_set(kind, v) != baseline)
            }
        }
    }

    /// Returns one conflict per work unit whose reports disagree.
    ///
    /// Units with a single report never conflict. Conflicts come out in the
    /// order their work units were first seen.
    #[must_use]
    pub fn build(&self, reports: &ReportBatch, kind: ConflictKind) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for group in group_by_work_unit(reports, kind) {
            if group.members.len() < 2 || !self.disagrees(kind, &group.members) {
                continue;
            }

            let conflict = Conflict::new(
                kind,
                group.work_unit_id,
                group
                    .members
                    .iter()
                    .map(|(worker_id, value)| (*worker_id, (*value).clone())),
            )
            .with_severity(self.severity);

            debug!(
                conflict_id = %conflict.id(),
                kind = %kind,
                work_unit_id = group.work_unit_id,
                workers = conflict.worker_count(),
                "conflict detected"
            );
            conflicts.push(conflict);
        }

        conflicts
    }
}
