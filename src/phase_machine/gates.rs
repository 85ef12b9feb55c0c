//! Planning gates (§4.4): spec coverage, phase leakage, acceptance
//! criterion quality. Evaluated when advancing *into* `validation`.

use crate::errors::PhaseError;
use crate::state::{PhaseTag, Task, RECOGNIZED_VERIFICATION_PREFIXES};
use std::collections::{BTreeMap, BTreeSet};

/// Tunable thresholds and keyword map, sourced from `tasker.toml`
/// `[gates]` with built-in defaults (spec.md §9 Open Question).
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub spec_coverage_threshold: f64,
    pub spec_coverage_threshold_steel_thread: f64,
    pub phase_leakage_keywords: BTreeMap<PhaseTag, Vec<String>>,
}

impl Default for GateConfig {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            PhaseTag::Executing,
            vec!["deploy".into(), "release".into(), "rollout".into()],
        );
        keywords.insert(
            PhaseTag::Validation,
            vec!["benchmark".into(), "load test".into()],
        );
        Self {
            spec_coverage_threshold: 0.9,
            spec_coverage_threshold_steel_thread: 1.0,
            phase_leakage_keywords: keywords,
        }
    }
}

/// Fraction of capability-map behaviors referenced by at least one task
/// must meet the configured threshold (lower for non-steel-thread
/// behaviors, 1.0 by default for steel-thread ones).
pub fn check_spec_coverage(
    tasks: &BTreeMap<String, Task>,
    steel_thread_behaviors: &BTreeSet<String>,
    all_behaviors: &BTreeSet<String>,
    cfg: &GateConfig,
) -> Result<(), PhaseError> {
    let referenced: BTreeSet<&str> = tasks
        .values()
        .flat_map(|t| t.behaviors.iter().map(String::as_str))
        .collect();

    let mut offenders = Vec::new();
    for behavior in all_behaviors {
        if referenced.contains(behavior.as_str()) {
            continue;
        }
        offenders.push(behavior.clone());
    }

    let steel_thread_missing = steel_thread_behaviors
        .iter()
        .filter(|b| !referenced.contains(b.as_str()))
        .count();
    let non_steel_thread_total = all_behaviors.len().saturating_sub(steel_thread_behaviors.len());
    let non_steel_thread_covered = all_behaviors
        .iter()
        .filter(|b| !steel_thread_behaviors.contains(*b) && referenced.contains(b.as_str()))
        .count();

    let steel_thread_ok = steel_thread_behaviors.is_empty()
        || (1.0 - steel_thread_missing as f64 / steel_thread_behaviors.len() as f64)
            >= cfg.spec_coverage_threshold_steel_thread;
    let non_steel_thread_ok = non_steel_thread_total == 0
        || (non_steel_thread_covered as f64 / non_steel_thread_total as f64)
            >= cfg.spec_coverage_threshold;

    if steel_thread_ok && non_steel_thread_ok {
        return Ok(());
    }
    Err(PhaseError::GateFailed {
        gate: "spec_coverage".to_string(),
        offenders,
    })
}

/// No task in the current phase may mention a future-phase keyword in
/// its name or acceptance-criteria text (case-insensitive).
pub fn check_phase_leakage(
    tasks: &BTreeMap<String, Task>,
    current_phase: PhaseTag,
    cfg: &GateConfig,
) -> Result<(), PhaseError> {
    let mut offenders = Vec::new();
    for task in tasks.values() {
        let haystack = format!(
            "{} {}",
            task.name,
            task.acceptance_criteria
                .iter()
                .map(|c| c.criterion.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        )
        .to_lowercase();
        for (phase, keywords) in &cfg.phase_leakage_keywords {
            if phase.rank() <= current_phase.rank() {
                continue;
            }
            if keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase())) {
                offenders.push(task.id.clone());
                break;
            }
        }
    }
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(PhaseError::GateFailed {
            gate: "phase_leakage".to_string(),
            offenders,
        })
    }
}

/// Every task must have at least one acceptance criterion; each
/// criterion's text must be non-empty and ≥10 chars; each verification
/// command must match a recognized executable prefix.
pub fn check_acceptance_criterion_quality(tasks: &BTreeMap<String, Task>) -> Result<(), PhaseError> {
    let mut offenders = Vec::new();
    for task in tasks.values() {
        if task.acceptance_criteria.is_empty() {
            offenders.push(task.id.clone());
            continue;
        }
        let bad = task.acceptance_criteria.iter().any(|c| {
            c.criterion.trim().len() < 10
                || c.verification.trim().is_empty()
                || !RECOGNIZED_VERIFICATION_PREFIXES
                    .iter()
                    .any(|p| c.verification.trim_start().starts_with(p))
        });
        if bad {
            offenders.push(task.id.clone());
        }
    }
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(PhaseError::GateFailed {
            gate: "acceptance_criterion_quality".to_string(),
            offenders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AcceptanceCriterion, Task};
    use std::path::PathBuf;

    fn task_with(id: &str, criteria: Vec<(&str, &str)>) -> Task {
        let mut t = Task::new(id, "name", 1, PathBuf::from("tasks/x.json"));
        t.acceptance_criteria = criteria
            .into_iter()
            .map(|(c, v)| AcceptanceCriterion {
                criterion: c.to_string(),
                verification: v.to_string(),
            })
            .collect();
        t
    }

    #[test]
    fn acceptance_criterion_quality_rejects_empty_criteria() {
        let tasks = [(
            "T001".to_string(),
            Task::new("T001", "n", 1, PathBuf::from("x")),
        )]
        .into_iter()
        .collect();
        let err = check_acceptance_criterion_quality(&tasks).unwrap_err();
        assert_eq!(err.code(), "GATE_FAILED");
    }

    #[test]
    fn acceptance_criterion_quality_rejects_unrecognized_verification() {
        let tasks = [(
            "T001".to_string(),
            task_with("T001", vec![("user can log in correctly", "echo ok")]),
        )]
        .into_iter()
        .collect();
        assert!(check_acceptance_criterion_quality(&tasks).is_err());
    }

    #[test]
    fn acceptance_criterion_quality_passes_with_recognized_command() {
        let tasks = [(
            "T001".to_string(),
            task_with("T001", vec![("user can log in correctly", "cargo test auth")]),
        )]
        .into_iter()
        .collect();
        assert!(check_acceptance_criterion_quality(&tasks).is_ok());
    }

    #[test]
    fn phase_leakage_flags_future_phase_keyword() {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "T001".to_string(),
            task_with("T001", vec![("deploy the release to prod", "cargo test x")]),
        );
        let cfg = GateConfig::default();
        let err = check_phase_leakage(&tasks, PhaseTag::Definition, &cfg).unwrap_err();
        assert_eq!(err.code(), "GATE_FAILED");
    }

    #[test]
    fn spec_coverage_requires_full_steel_thread_coverage_by_default() {
        let tasks = BTreeMap::new();
        let steel_thread: BTreeSet<String> = ["auth.login".to_string()].into_iter().collect();
        let all: BTreeSet<String> = ["auth.login".to_string()].into_iter().collect();
        let err = check_spec_coverage(&tasks, &steel_thread, &all, &GateConfig::default()).unwrap_err();
        assert_eq!(err.code(), "GATE_FAILED");
    }
}
