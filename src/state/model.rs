//! The state document: schema version, phase, tasks, counters, halt,
//! checkpoint, events, artifacts (spec.md §3).

use super::event::{Event, EventType};
use super::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Current schema version written by this binary. `Load` rejects any
/// document whose `schema_version` differs (SCHEMA_VERSION_MISMATCH).
pub const SCHEMA_VERSION: &str = "1.0";

/// Canonical phase order (spec.md §4.4). Index in this slice is the
/// phase's rank for ordering / prefix checks (I-8).
pub const PHASE_ORDER: &[PhaseTag] = &[
    PhaseTag::Ingestion,
    PhaseTag::SpecReview,
    PhaseTag::Logical,
    PhaseTag::Physical,
    PhaseTag::Definition,
    PhaseTag::Validation,
    PhaseTag::Sequencing,
    PhaseTag::Ready,
    PhaseTag::Executing,
    PhaseTag::Complete,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    Ingestion,
    SpecReview,
    Logical,
    Physical,
    Definition,
    Validation,
    Sequencing,
    Ready,
    Executing,
    Complete,
}

impl PhaseTag {
    pub fn rank(&self) -> usize {
        PHASE_ORDER.iter().position(|p| p == self).expect("all tags are in PHASE_ORDER")
    }

    pub fn next(&self) -> Option<PhaseTag> {
        PHASE_ORDER.get(self.rank() + 1).copied()
    }

    /// The `snake_case` name this tag serializes as, e.g. `"spec_review"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::SpecReview => "spec_review",
            Self::Logical => "logical",
            Self::Physical => "physical",
            Self::Definition => "definition",
            Self::Validation => "validation",
            Self::Sequencing => "sequencing",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub current: PhaseTag,
    #[serde(default)]
    pub completed: Vec<PhaseTag>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            current: PhaseTag::Ingestion,
            completed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionCounters {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub completed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Halt {
    pub requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointEntryStatus {
    PendingDispatch,
    Success,
    Failed,
    Orphaned,
}

impl CheckpointEntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Orphaned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub batch: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub per_task_result: BTreeMap<String, CheckpointEntryStatus>,
}

impl Checkpoint {
    pub fn new(batch: Vec<String>) -> Self {
        let per_task_result = batch
            .iter()
            .map(|id| (id.clone(), CheckpointEntryStatus::PendingDispatch))
            .collect();
        Self {
            batch,
            created_at: Utc::now(),
            per_task_result,
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.per_task_result.values().all(|s| s.is_terminal())
    }
}

/// The single, lock-protected, append-only-eventful source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub schema_version: String,
    pub target_dir: PathBuf,
    pub phase: PhaseState,
    pub tasks: BTreeMap<String, Task>,
    pub counters: ExecutionCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<Halt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    pub events: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<BTreeMap<String, Value>>,
}

impl StateDocument {
    /// Create a fresh state document for a working directory (`init`).
    pub fn new(target_dir: PathBuf) -> Self {
        let mut doc = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            target_dir,
            phase: PhaseState::default(),
            tasks: BTreeMap::new(),
            counters: ExecutionCounters::default(),
            halt: None,
            checkpoint: None,
            events: Vec::new(),
            artifacts: None,
        };
        doc.push_event(EventType::StateInitialized, Value::Null);
        doc
    }

    pub fn halt_requested(&self) -> bool {
        self.halt.as_ref().is_some_and(|h| h.requested)
    }

    /// Append an event. Internal helper used by every mutating operation
    /// in `state::ops` so the log stays monotonic (I-9).
    pub(crate) fn push_event(&mut self, kind: EventType, details: Value) {
        self.events.push(Event::new(kind, details));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_ranks_are_strictly_increasing() {
        for w in PHASE_ORDER.windows(2) {
            assert!(w[0].rank() < w[1].rank());
        }
    }

    #[test]
    fn phase_tag_next_returns_none_after_complete() {
        assert_eq!(PhaseTag::Complete.next(), None);
        assert_eq!(PhaseTag::Ingestion.next(), Some(PhaseTag::SpecReview));
    }

    #[test]
    fn phase_tag_as_str_matches_serde_rename() {
        for tag in PHASE_ORDER {
            let serialized = serde_json::to_string(tag).unwrap();
            assert_eq!(serialized, format!("\"{}\"", tag.as_str()));
        }
    }

    #[test]
    fn new_state_document_has_one_init_event() {
        let doc = StateDocument::new(PathBuf::from("/tmp/proj"));
        assert_eq!(doc.events.len(), 1);
        assert_eq!(doc.events[0].kind, EventType::StateInitialized);
        assert_eq!(doc.phase.current, PhaseTag::Ingestion);
        assert!(doc.phase.completed.is_empty());
    }

    #[test]
    fn checkpoint_all_terminal_false_until_every_entry_resolves() {
        let mut cp = Checkpoint::new(vec!["T001".into(), "T002".into()]);
        assert!(!cp.all_terminal());
        cp.per_task_result
            .insert("T001".into(), CheckpointEntryStatus::Success);
        assert!(!cp.all_terminal());
        cp.per_task_result
            .insert("T002".into(), CheckpointEntryStatus::Orphaned);
        assert!(cp.all_terminal());
    }

    #[test]
    fn state_document_round_trips_through_json() {
        let doc = StateDocument::new(PathBuf::from("/tmp/proj"));
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: StateDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schema_version, doc.schema_version);
        assert_eq!(back.phase.current, doc.phase.current);
        assert_eq!(back.events.len(), doc.events.len());
    }
}
