//! Phase Machine (C4): ordered phases with guarded transitions.

pub mod gates;

use crate::errors::{PhaseError, TaskerError};
use crate::graph::TaskGraph;
use crate::state::{PhaseTag, StateDocument, TaskStatus};
use gates::GateConfig;
use std::collections::BTreeSet;

/// Inputs the planning gates need that live outside the state document
/// (the capability-map's behavior inventory).
#[derive(Debug, Default)]
pub struct SpecCoverageInputs {
    pub all_behaviors: BTreeSet<String>,
    pub steel_thread_behaviors: BTreeSet<String>,
}

/// The registered spec-review verdict gating `validation -> sequencing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecReviewVerdict {
    Ready,
    ReadyWithNotes,
    NotReady,
}

impl SpecReviewVerdict {
    fn satisfies_gate(self) -> bool {
        matches!(self, Self::Ready | Self::ReadyWithNotes)
    }
}

/// Attempt to advance `doc.phase.current` to the next canonical phase.
/// Performs the phase-specific extra gates and, when advancing into
/// `validation`, the planning gates (§4.4). On success, appends
/// `phase_advanced` and moves the current phase into `completed`.
pub fn advance(
    doc: &mut StateDocument,
    graph: Option<&TaskGraph>,
    spec_review: Option<SpecReviewVerdict>,
    coverage: &SpecCoverageInputs,
    gate_cfg: &GateConfig,
) -> Result<(), TaskerError> {
    let current = doc.phase.current;
    let Some(next) = current.next() else {
        return Err(PhaseError::NotAllComplete.into());
    };

    match current {
        PhaseTag::Definition => {
            gates::check_spec_coverage(
                &doc.tasks,
                &coverage.steel_thread_behaviors,
                &coverage.all_behaviors,
                gate_cfg,
            )?;
            gates::check_phase_leakage(&doc.tasks, current, gate_cfg)?;
            gates::check_acceptance_criterion_quality(&doc.tasks)?;
        }
        PhaseTag::Validation => {
            let ok = spec_review.is_some_and(SpecReviewVerdict::satisfies_gate);
            if !ok {
                return Err(PhaseError::GateFailed {
                    gate: "spec_review_verdict".to_string(),
                    offenders: vec![],
                }
                .into());
            }
        }
        PhaseTag::Sequencing => {
            let graph = graph.ok_or_else(|| PhaseError::GateFailed {
                gate: "task_graph".to_string(),
                offenders: vec![],
            })?;
            graph.validate_steel_thread(&doc.tasks)?;
        }
        PhaseTag::Executing => {
            let all_terminal = doc.tasks.values().all(|t| t.status.is_terminal());
            if !all_terminal {
                return Err(PhaseError::NotAllComplete.into());
            }
        }
        _ => {}
    }

    doc.phase.completed.push(current);
    doc.phase.current = next;
    doc.push_event(
        crate::state::EventType::PhaseAdvanced,
        serde_json::json!({ "from": current, "to": next }),
    );
    Ok(())
}

/// True iff every task relevant to the current execution phase is
/// terminal — used by the supervisor loop to decide whether to call
/// `advance` when the ready set is empty.
pub fn executing_is_drained(doc: &StateDocument) -> bool {
    doc.phase.current == PhaseTag::Executing
        && doc.tasks.values().all(|t| t.status.is_terminal())
        && !doc.tasks.is_empty()
}
