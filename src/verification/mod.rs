//! Verification Ledger (C7): per-attempt verdicts already live on each
//! [`crate::state::Task`]; this module adds the calibration ledger and
//! the derived metrics computed over both.

use crate::state::{Recommendation, Score, StateDocument, TaskStatus, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of comparing a recorded verdict/recommendation against what
/// actually happened once the task's changes were reviewed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualOutcome {
    Correct,
    FalsePositive,
    FalseNegative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub task_id: String,
    pub verdict: Verdict,
    pub recommendation: Recommendation,
    pub actual_outcome: ActualOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationLedger {
    pub entries: Vec<CalibrationEntry>,
}

impl CalibrationLedger {
    pub fn record(&mut self, task_id: String, verdict: Verdict, recommendation: Recommendation, actual_outcome: ActualOutcome) {
        self.entries.push(CalibrationEntry {
            task_id,
            verdict,
            recommendation,
            actual_outcome,
            recorded_at: Utc::now(),
        });
    }

    /// `correct / total_verified`, or `None` if nothing has been recorded.
    pub fn calibration_score(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let correct = self
            .entries
            .iter()
            .filter(|e| e.actual_outcome == ActualOutcome::Correct)
            .count();
        Some(correct as f64 / self.entries.len() as f64)
    }
}

/// Derived metrics exposed by the `metrics` CLI subcommand (§4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub task_success_rate: f64,
    pub first_attempt_success_rate: f64,
    pub average_attempts: f64,
    pub tokens_per_completed_task: f64,
    pub cost_per_completed_task: f64,
    pub functional_criterion_pass_rate: f64,
    pub quality_pass_rate: f64,
    pub test_edge_case_rate: f64,
    pub calibration_score: Option<f64>,
}

pub fn compute_metrics(doc: &StateDocument, ledger: &CalibrationLedger) -> Metrics {
    let terminal: Vec<_> = doc
        .tasks
        .values()
        .filter(|t| matches!(t.status, TaskStatus::Complete | TaskStatus::Failed))
        .collect();
    let completed: Vec<_> = doc
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Complete)
        .collect();

    let task_success_rate = ratio(completed.len(), terminal.len());
    let first_attempt_success_rate = ratio(
        completed.iter().filter(|t| t.attempts == 1).count(),
        completed.len(),
    );
    let average_attempts = if terminal.is_empty() {
        0.0
    } else {
        terminal.iter().map(|t| t.attempts as f64).sum::<f64>() / terminal.len() as f64
    };
    let tokens_per_completed_task = if completed.is_empty() {
        0.0
    } else {
        doc.counters.total_tokens as f64 / completed.len() as f64
    };
    let cost_per_completed_task = if completed.is_empty() {
        0.0
    } else {
        doc.counters.total_cost / completed.len() as f64
    };

    let verified: Vec<_> = doc.tasks.values().filter_map(|t| t.verification.as_ref()).collect();
    let functional_criterion_pass_rate = {
        let total: usize = verified.iter().map(|v| v.criteria.len()).sum();
        let passing: usize = verified
            .iter()
            .flat_map(|v| v.criteria.iter())
            .filter(|c| c.score == Score::Pass)
            .count();
        ratio(passing, total)
    };
    let quality_pass_rate = {
        let scores: Vec<Score> = verified
            .iter()
            .flat_map(|v| [v.quality.types, v.quality.docs, v.quality.patterns, v.quality.errors])
            .collect();
        let passing = scores.iter().filter(|s| **s == Score::Pass).count();
        ratio(passing, scores.len())
    };
    let test_edge_case_rate = {
        let total_assertions: u32 = verified.iter().map(|v| v.tests.assertions).sum();
        let total_edge_cases: u32 = verified.iter().map(|v| v.tests.edge_cases).sum();
        if total_assertions == 0 {
            0.0
        } else {
            total_edge_cases as f64 / total_assertions as f64
        }
    };

    Metrics {
        task_success_rate,
        first_attempt_success_rate,
        average_attempts,
        tokens_per_completed_task,
        cost_per_completed_task,
        functional_criterion_pass_rate,
        quality_pass_rate,
        test_edge_case_rate,
        calibration_score: ledger.calibration_score(),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Criterion, Quality, Task, TestsInfo, Verification};
    use std::path::PathBuf;

    fn verified_task(id: &str, attempts: u32, status: TaskStatus, verdict: Verdict) -> Task {
        let mut t = Task::new(id, "n", 1, PathBuf::from("x"));
        t.attempts = attempts;
        t.status = status;
        t.verification = Some(Verification {
            verdict,
            recommendation: Recommendation::Proceed,
            criteria: vec![Criterion {
                name: "c1".to_string(),
                score: Score::Pass,
                evidence: "e".to_string(),
            }],
            quality: Quality {
                types: Score::Pass,
                docs: Score::Pass,
                patterns: Score::Pass,
                errors: Score::Pass,
            },
            tests: TestsInfo {
                coverage: 0.9,
                assertions: 10,
                edge_cases: 2,
            },
            verified_at: Utc::now(),
        });
        t
    }

    #[test]
    fn calibration_score_is_none_with_no_entries() {
        let ledger = CalibrationLedger::default();
        assert_eq!(ledger.calibration_score(), None);
    }

    #[test]
    fn calibration_score_computes_correct_fraction() {
        let mut ledger = CalibrationLedger::default();
        ledger.record("T001".into(), Verdict::Pass, Recommendation::Proceed, ActualOutcome::Correct);
        ledger.record("T002".into(), Verdict::Pass, Recommendation::Proceed, ActualOutcome::FalsePositive);
        assert_eq!(ledger.calibration_score(), Some(0.5));
    }

    #[test]
    fn compute_metrics_reflects_completed_and_failed_tasks() {
        let mut doc = StateDocument::new(PathBuf::from("/tmp"));
        doc.tasks.insert(
            "T001".into(),
            verified_task("T001", 1, TaskStatus::Complete, Verdict::Pass),
        );
        doc.tasks.insert(
            "T002".into(),
            verified_task("T002", 2, TaskStatus::Failed, Verdict::Fail),
        );
        doc.counters.total_tokens = 1000;
        doc.counters.total_cost = 2.0;

        let metrics = compute_metrics(&doc, &CalibrationLedger::default());
        assert_eq!(metrics.task_success_rate, 0.5);
        assert_eq!(metrics.first_attempt_success_rate, 1.0);
        assert_eq!(metrics.average_attempts, 1.5);
        assert_eq!(metrics.tokens_per_completed_task, 1000.0);
        assert_eq!(metrics.functional_criterion_pass_rate, 1.0);
    }
}
