//! Worker reports and report batches.
//!
//! A [`ReportBatch`] is the unit of input to detection: an insertion-ordered
//! mapping from worker id to that worker's [`WorkerReport`]. Supply order is
//! significant because it determines `involved_workers` order and voting
//! tie-breaks downstream.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::trace;

use crate::conflict::ConflictKind;

/// A single worker's report about one work unit.
///
/// A report may carry one value per conflict kind under the kind's field key
/// (`output`, `requirements`, `dependencies`, `state`, `resource`). `payload`
/// is the fallback for kinds without their own field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Correlation key shared by reports about the same work unit.
    #[serde(default, alias = "unit", alias = "task_id")]
    pub work_unit_id: Option<String>,

    /// Value compared when the report has no field for the kind.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,

    /// Per-kind values and any other fields the worker sent.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WorkerReport {
    /// Creates a report for the given work unit.
    #[must_use]
    pub fn new(work_unit_id: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            work_unit_id: Some(work_unit_id.into()),
            payload: payload.into(),
            fields: Map::new(),
        }
    }

    /// Creates a report with no payload; values are added with
    /// [`with_field`](Self::with_field).
    #[must_use]
    pub fn for_unit(work_unit_id: impl Into<String>) -> Self {
        Self {
            work_unit_id: Some(work_unit_id.into()),
            ..Self::default()
        }
    }

    /// Creates a report that has not been assigned to a work unit yet.
    #[must_use]
    pub fn unassigned(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Adds a named field, e.g. `output` or `dependencies`.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the work unit id, treating blank ids as missing.
    #[must_use]
    pub fn work_unit(&self) -> Option<&str> {
        self.work_unit_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// The value compared for `kind`.
    ///
    /// The kind's own field wins over `payload`. Returns `None` when the
    /// report says nothing about this kind.
    #[must_use]
    pub fn value_for(&self, kind: ConflictKind) -> Option<&Value> {
        match self.fields.get(kind.field_key()) {
            Some(value) => Some(value),
            None if self.payload.is_null() => None,
            None => Some(&self.payload),
        }
    }
}

/// Insertion-ordered mapping from worker id to report.
///
/// Worker ids are unique; inserting a report for a worker that is already
/// present replaces its report without changing its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportBatch {
    entries: Vec<(String, WorkerReport)>,
}

impl ReportBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the report for `worker_id`.
    ///
    /// Returns the previous report for that worker, if any.
    pub fn insert(
        &mut self,
        worker_id: impl Into<String>,
        report: WorkerReport,
    ) -> Option<WorkerReport> {
        let worker_id = worker_id.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(id, _)| *id == worker_id) {
            return Some(std::mem::replace(existing, report));
        }
        self.entries.push((worker_id, report));
        None
    }

    /// Builder-style variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, worker_id: impl Into<String>, report: WorkerReport) -> Self {
        self.insert(worker_id, report);
        self
    }

    /// Returns the report for `worker_id`.
    #[must_use]
    pub fn get(&self, worker_id: &str) -> Option<&WorkerReport> {
        self.entries
            .iter()
            .find(|(id, _)| id == worker_id)
            .map(|(_, report)| report)
    }

    /// Iterates `(worker_id, report)` pairs in supply order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkerReport)> {
        self.entries.iter().map(|(id, report)| (id.as_str(), report))
    }

    /// Number of workers in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the batch has no reports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<W: Into<String>> FromIterator<(W, WorkerReport)> for ReportBatch {
    fn from_iter<I: IntoIterator<Item = (W, WorkerReport)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (worker_id, report) in iter {
            batch.insert(worker_id, report);
        }
        batch
    }
}

impl Serialize for ReportBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (worker_id, report) in &self.entries {
            map.serialize_entry(worker_id, report)?;
        }
        map.end()
    }
}

struct ReportBatchVisitor;

impl<'de> Visitor<'de> for ReportBatchVisitor {
    type Value = ReportBatch;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map from worker id to report")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut batch = ReportBatch::new();
        while let Some((worker_id, raw)) = access.next_entry::<String, Value>()? {
            match serde_json::from_value::<WorkerReport>(raw) {
                Ok(report) => {
                    batch.insert(worker_id, report);
                }
                Err(e) => trace!(worker_id, error = %e, "skipping malformed report"),
            }
        }
        Ok(batch)
    }
}

impl<'de> Deserialize<'de> for ReportBatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ReportBatchVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_preserves_order_and_replaces_in_place() {
        let mut batch = ReportBatch::new();
        batch.insert("w2", WorkerReport::new("u1", "A"));
        batch.insert("w1", WorkerReport::new("u1", "B"));
        let previous = batch.insert("w2", WorkerReport::new("u1", "C"));

        assert_eq!(previous, Some(WorkerReport::new("u1", "A")));
        let order: Vec<&str> = batch.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["w2", "w1"]);
        assert_eq!(batch.get("w2").unwrap().payload, json!("C"));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn blank_work_unit_counts_as_missing() {
        assert_eq!(WorkerReport::new("  ", "A").work_unit(), None);
        assert_eq!(WorkerReport::unassigned("A").work_unit(), None);
        assert_eq!(WorkerReport::new(" u1 ", "A").work_unit(), Some("u1"));
    }

    #[test]
    fn deserialize_keeps_document_order_and_aliases() {
        let raw = r#"{
            "zeta": {"unit": "u1", "output": "A"},
            "alpha": {"task_id": "u1", "dependencies": ["x", "y"]},
            "mid": {"payload": 3}
        }"#;
        let batch: ReportBatch = serde_json::from_str(raw).unwrap();

        let order: Vec<&str> = batch.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
        assert_eq!(batch.get("zeta").unwrap().work_unit(), Some("u1"));
        let alpha = batch.get("alpha").unwrap();
        assert_eq!(
            alpha.value_for(ConflictKind::DependencyMismatch),
            Some(&json!(["x", "y"]))
        );
        assert_eq!(alpha.value_for(ConflictKind::OutputMismatch), None);
        assert_eq!(batch.get("mid").unwrap().work_unit(), None);
    }

    #[test]
    fn report_with_output_and_dependencies_keeps_both() {
        let raw = r#"{"w1": {"unit": "u1", "output": "A", "dependencies": ["x"]}}"#;
        let batch: ReportBatch = serde_json::from_str(raw).unwrap();

        let report = batch.get("w1").unwrap();
        assert_eq!(report.value_for(ConflictKind::OutputMismatch), Some(&json!("A")));
        assert_eq!(
            report.value_for(ConflictKind::DependencyMismatch),
            Some(&json!(["x"]))
        );
        assert_eq!(report.value_for(ConflictKind::StateMismatch), None);
    }

    #[test]
    fn kind_field_wins_over_payload() {
        let report = WorkerReport::new("u1", "fallback").with_field("state", "ready");
        assert_eq!(report.value_for(ConflictKind::StateMismatch), Some(&json!("ready")));
        assert_eq!(
            report.value_for(ConflictKind::OutputMismatch),
            Some(&json!("fallback"))
        );
    }

    #[test]
    fn malformed_report_is_skipped_not_fatal() {
        let raw = r#"{
            "w1": {"unit": "u1", "output": "A"},
            "w2": {"unit": 7, "output": "B"},
            "w3": "not a report",
            "w4": {"unit": "u1", "output": "C"}
        }"#;
        let batch: ReportBatch = serde_json::from_str(raw).unwrap();

        let order: Vec<&str> = batch.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["w1", "w4"]);
    }

    #[test]
    fn serialize_round_trips_order() {
        let batch: ReportBatch = vec![
            ("b", WorkerReport::new("u1", "X")),
            ("a", WorkerReport::new("u1", "Y")),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&batch).unwrap();
        let back: ReportBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(batch, back);
    }
}
