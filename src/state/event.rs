//! Append-only event log (spec.md §3 Event, invariant I-9).

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Well-known event kinds. `Other` preserves forward-compatibility for
/// event types emitted by a newer schema version (design note: tagged
/// variants for well-known structures, an extras bag for the rest).
/// Serializes as a plain string; round-trips unknown strings through
/// `Other` rather than rejecting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    StateInitialized,
    PhaseAdvanced,
    TaskLoaded,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetried,
    TaskSkipped,
    TaskPhaseReassigned,
    TokensLogged,
    HaltRequested,
    ExecutionResumed,
    CheckpointCreated,
    CheckpointUpdated,
    CheckpointCompleted,
    CheckpointCleared,
    StateRecovered,
    VerificationRecorded,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::StateInitialized => "state_initialized",
            Self::PhaseAdvanced => "phase_advanced",
            Self::TaskLoaded => "task_loaded",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskRetried => "task_retried",
            Self::TaskSkipped => "task_skipped",
            Self::TaskPhaseReassigned => "task_phase_reassigned",
            Self::TokensLogged => "tokens_logged",
            Self::HaltRequested => "halt_requested",
            Self::ExecutionResumed => "execution_resumed",
            Self::CheckpointCreated => "checkpoint_created",
            Self::CheckpointUpdated => "checkpoint_updated",
            Self::CheckpointCompleted => "checkpoint_completed",
            Self::CheckpointCleared => "checkpoint_cleared",
            Self::StateRecovered => "state_recovered",
            Self::VerificationRecorded => "verification_recorded",
            Self::Other(s) => s,
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "state_initialized" => Self::StateInitialized,
            "phase_advanced" => Self::PhaseAdvanced,
            "task_loaded" => Self::TaskLoaded,
            "task_started" => Self::TaskStarted,
            "task_completed" => Self::TaskCompleted,
            "task_failed" => Self::TaskFailed,
            "task_retried" => Self::TaskRetried,
            "task_skipped" => Self::TaskSkipped,
            "task_phase_reassigned" => Self::TaskPhaseReassigned,
            "tokens_logged" => Self::TokensLogged,
            "halt_requested" => Self::HaltRequested,
            "execution_resumed" => Self::ExecutionResumed,
            "checkpoint_created" => Self::CheckpointCreated,
            "checkpoint_updated" => Self::CheckpointUpdated,
            "checkpoint_completed" => Self::CheckpointCompleted,
            "checkpoint_cleared" => Self::CheckpointCleared,
            "state_recovered" => Self::StateRecovered,
            "verification_recorded" => Self::VerificationRecorded,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(EventType::from_str(&s))
    }
}

/// A single append-only log entry. Never rewritten once appended (I-9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default)]
    pub details: Value,
}

impl Event {
    pub fn new(kind: EventType, details: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_serde() {
        let kind = EventType::TaskStarted;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"task_started\"");
    }

    #[test]
    fn event_type_as_str_matches_serde_tag() {
        for (kind, expected) in [
            (EventType::StateInitialized, "state_initialized"),
            (EventType::CheckpointCleared, "checkpoint_cleared"),
            (EventType::VerificationRecorded, "verification_recorded"),
        ] {
            assert_eq!(kind.as_str(), expected);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", expected));
        }
    }
}
