//! Conflict types for tracking disagreement between workers.
//!
//! Conflicts are explicit objects, not hidden errors. When workers report
//! different results for the same work unit we create a Conflict record that
//! captures every worker's payload at detection time. A Conflict never
//! changes after it is created; how it was settled lives in separate
//! [`Resolution`](crate::Resolution) records.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::{Canonicalizer, DisplayCanonicalizer};
use crate::error::ValidationError;

/// Unique identifier for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Creates a new random conflict ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How payloads of a conflict kind are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// One opaque value per worker, compared by canonical key.
    Canonical,

    /// A list of items per worker, compared as an unordered set.
    UnorderedSet,
}

/// The kind of disagreement between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Workers produced different outputs.
    OutputMismatch,

    /// Workers read the requirements of the work unit differently.
    InterpretationMismatch,

    /// Workers disagree on what the work unit depends on.
    DependencyMismatch,

    /// Workers observed different states.
    StateMismatch,

    /// Workers claim the same resource.
    ResourceConflict,
}

impl ConflictKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::OutputMismatch,
        Self::InterpretationMismatch,
        Self::DependencyMismatch,
        Self::StateMismatch,
        Self::ResourceConflict,
    ];

    /// Returns the comparison policy for this kind.
    #[must_use]
    pub const fn comparison(self) -> Comparison {
        match self {
            Self::InterpretationMismatch | Self::DependencyMismatch => Comparison::UnorderedSet,
            Self::OutputMismatch | Self::StateMismatch | Self::ResourceConflict => {
                Comparison::Canonical
            }
        }
    }

    /// Report field that carries the value compared for this kind.
    #[must_use]
    pub const fn field_key(self) -> &'static str {
        match self {
            Self::OutputMismatch => "output",
            Self::InterpretationMismatch => "requirements",
            Self::DependencyMismatch => "dependencies",
            Self::StateMismatch => "state",
            Self::ResourceConflict => "resource",
        }
    }

    /// Object key that holds the item list for set-compared kinds.
    #[must_use]
    pub const fn items_key(self) -> Option<&'static str> {
        match self {
            Self::InterpretationMismatch => Some("requirements"),
            Self::DependencyMismatch => Some("dependencies"),
            _ => None,
        }
    }

    /// Returns a short stable identifier suitable for logging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OutputMismatch => "output_mismatch",
            Self::InterpretationMismatch => "interpretation_mismatch",
            Self::DependencyMismatch => "dependency_mismatch",
            Self::StateMismatch => "state_mismatch",
            Self::ResourceConflict => "resource_conflict",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How serious a conflict is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic disagreement.
    Low,

    /// The default.
    Medium,

    /// Disagreement that blocks downstream work.
    High,

    /// Disagreement that must be handled before anything else.
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A disagreement between workers about one work unit.
///
/// Deserialization checks the record: repeated workers collapse to their
/// first position, and every worker must have exactly one payload in
/// `details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ConflictRecord")]
pub struct Conflict {
    id: ConflictId,
    kind: ConflictKind,
    work_unit_id: String,
    involved_workers: Vec<String>,
    details: BTreeMap<String, Value>,
    #[serde(default)]
    severity: Severity,
    detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Creates a conflict from per-worker payloads in supply order.
    ///
    /// A worker listed more than once keeps its first position and its last
    /// payload.
    #[must_use]
    pub fn new<I, W>(kind: ConflictKind, work_unit_id: impl Into<String>, payloads: I) -> Self
    where
        I: IntoIterator<Item = (W, Value)>,
        W: Into<String>,
    {
        let mut involved_workers = Vec::new();
        let mut details = BTreeMap::new();
        for (worker_id, payload) in payloads {
            let worker_id = worker_id.into();
            if !details.contains_key(&worker_id) {
                involved_workers.push(worker_id.clone());
            }
            details.insert(worker_id, payload);
        }

        Self {
            id: ConflictId::new(),
            kind,
            work_unit_id: work_unit_id.into(),
            involved_workers,
            details,
            severity: Severity::default(),
            detected_at: Utc::now(),
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Unique id of this conflict instance.
    #[must_use]
    pub fn id(&self) -> ConflictId {
        self.id
    }

    /// The kind of disagreement.
    #[must_use]
    pub fn kind(&self) -> ConflictKind {
        self.kind
    }

    /// The work unit the workers disagree about.
    #[must_use]
    pub fn work_unit_id(&self) -> &str {
        &self.work_unit_id
    }

    /// Workers involved, in the order their reports were supplied.
    #[must_use]
    pub fn involved_workers(&self) -> &[String] {
        &self.involved_workers
    }

    /// Every involved worker's payload.
    #[must_use]
    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    /// Returns the payload reported by `worker_id`.
    #[must_use]
    pub fn payload_of(&self, worker_id: &str) -> Option<&Value> {
        self.details.get(worker_id)
    }

    /// Iterates `(worker_id, payload)` in supply order.
    pub fn payloads(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.involved_workers
            .iter()
            .filter_map(|w| self.details.get(w).map(|p| (w.as_str(), p)))
    }

    /// Severity of the conflict.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// When the conflict was detected.
    #[must_use]
    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Number of involved workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.involved_workers.len()
    }

    /// Returns true if fewer than two workers are involved.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.involved_workers.len() < 2
    }

    /// Stable digest of what the conflict is about.
    ///
    /// Covers kind, work unit and each worker's canonical payload, but not the
    /// id, severity or detection time. Two detections of the same
    /// disagreement share a fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canon = DisplayCanonicalizer;
        let mut h = blake3::Hasher::new();
        h.update(self.kind.name().as_bytes());
        h.update(&[0]);
        h.update(self.work_unit_id.as_bytes());
        for (worker_id, payload) in &self.details {
            h.update(&[0]);
            h.update(worker_id.as_bytes());
            h.update(&[0x1f]);
            h.update(canon.canonical_key(payload).as_bytes());
        }
        h.finalize().to_hex().to_string()
    }
}

/// Wire shape of a [`Conflict`] before validation.
#[derive(Deserialize)]
struct ConflictRecord {
    id: ConflictId,
    kind: ConflictKind,
    work_unit_id: String,
    involved_workers: Vec<String>,
    details: BTreeMap<String, Value>,
    #[serde(default)]
    severity: Severity,
    detected_at: DateTime<Utc>,
}

impl TryFrom<ConflictRecord> for Conflict {
    type Error = ValidationError;

    fn try_from(record: ConflictRecord) -> Result<Self, Self::Error> {
        let mut seen = HashSet::new();
        let involved_workers: Vec<String> = record
            .involved_workers
            .into_iter()
            .filter(|w| seen.insert(w.clone()))
            .collect();

        if let Some(missing) = involved_workers
            .iter()
            .find(|w| !record.details.contains_key(*w))
        {
            return Err(ValidationError::InvalidConflict {
                reason: format!("worker '{missing}' has no payload in details"),
            });
        }
        if let Some(extra) = record.details.keys().find(|w| !seen.contains(*w)) {
            return Err(ValidationError::InvalidConflict {
                reason: format!("details entry '{extra}' is not an involved worker"),
            });
        }

        Ok(Self {
            id: record.id,
            kind: record.kind,
            work_unit_id: record.work_unit_id,
            involved_workers,
            details: record.details,
            severity: record.severity,
            detected_at: record.detected_at,
        })
    }
}

impl PartialEq for Conflict {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Conflict {}

impl std::hash::Hash for Conflict {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
