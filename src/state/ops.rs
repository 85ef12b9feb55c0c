//! Mutating operations on a [`StateDocument`], each enforcing the
//! relevant invariants (I-1..I-9) before applying a change, then
//! appending an event and updating aggregate counters (spec.md §4.2).
//!
//! Every function here is meant to run inside `storage::WithLock` — none
//! of them take or release a lock themselves.

use super::event::EventType;
use super::model::{Checkpoint, CheckpointEntryStatus, Halt, StateDocument};
use super::task::{Task, TaskStatus, Verification};
use crate::errors::{StateError, TaskError, TaskerError};
use chrono::Utc;
use serde_json::json;

type Result<T> = std::result::Result<T, TaskerError>;

impl StateDocument {
    fn require_task(&self, id: &str) -> Result<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| TaskError::UnknownId(id.to_string()).into())
    }

    /// I-1: every id mentioned by a task's `depends_on`/`blocks` exists.
    fn check_references_exist(&self, task: &Task) -> Result<()> {
        for dep in task.depends_on.iter().chain(task.blocks.iter()) {
            if !self.tasks.contains_key(dep) {
                return Err(StateError::Invariant {
                    name: "I-1",
                    detail: format!("task '{}' references unknown id '{}'", task.id, dep),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Load a task definition into the state document (definition phase).
    /// Reassigns `phase` last-writer-wins if the task already exists,
    /// logging a `task_phase_reassigned` event naming both values
    /// (design note, spec.md §9 Open Question resolution).
    pub fn load_task(&mut self, task: Task) -> Result<()> {
        self.check_references_exist(&task)?;
        let id = task.id.clone();
        if let Some(existing) = self.tasks.get(&id) {
            if existing.phase != task.phase {
                let (old, new) = (existing.phase, task.phase);
                self.tasks.insert(id.clone(), task);
                self.push_event(
                    EventType::TaskPhaseReassigned,
                    json!({ "task_id": id, "old_phase": old, "new_phase": new }),
                );
                return Ok(());
            }
        }
        self.tasks.insert(id.clone(), task);
        self.push_event(EventType::TaskLoaded, json!({ "task_id": id }));
        Ok(())
    }

    /// Recompute `pending -> ready` for every task whose dependencies are
    /// now satisfied. Called after any status change. Not itself an
    /// event-producing operation; readiness is a derived fact, not a
    /// logged transition.
    pub fn refresh_ready_statuses(&mut self) {
        let satisfied: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.depends_on.iter().all(|dep| {
                    self.tasks
                        .get(dep)
                        .is_some_and(|d| d.status.satisfies_dependency())
                })
            })
            .map(|t| t.id.clone())
            .collect();
        for id in satisfied {
            if let Some(t) = self.tasks.get_mut(&id) {
                t.status = TaskStatus::Ready;
            }
        }
    }

    /// `ready -> running`. I-4: rejected if halt is requested. I-5: the
    /// task must be part of the current checkpoint's unresolved batch.
    pub fn start_task(&mut self, id: &str) -> Result<()> {
        if self.halt_requested() {
            return Err(TaskerError::Halted);
        }
        let in_checkpoint = self
            .checkpoint
            .as_ref()
            .is_some_and(|c| c.per_task_result.contains_key(id));
        if !in_checkpoint {
            return Err(StateError::Invariant {
                name: "I-5",
                detail: format!("task '{id}' started outside any checkpoint batch"),
            }
            .into());
        }
        let task = self.require_task(id)?;
        if task.status != TaskStatus::Ready && task.status != TaskStatus::Pending {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: task.status.to_string(),
                to: "running".to_string(),
            }
            .into());
        }
        let task = self.tasks.get_mut(id).expect("checked by require_task");
        task.status = TaskStatus::Running;
        task.attempts += 1;
        task.started_at = Some(Utc::now());
        self.push_event(
            EventType::TaskStarted,
            json!({ "task_id": id, "attempt": task.attempts }),
        );
        Ok(())
    }

    /// `running -> complete`.
    pub fn complete_task(
        &mut self,
        id: &str,
        files_created: Vec<String>,
        files_modified: Vec<String>,
    ) -> Result<()> {
        let task = self.require_task(id)?;
        if task.status != TaskStatus::Running {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: task.status.to_string(),
                to: "complete".to_string(),
            }
            .into());
        }
        let started_at = task.started_at;
        let task = self.tasks.get_mut(id).expect("checked by require_task");
        let now = Utc::now();
        task.status = TaskStatus::Complete;
        task.completed_at = Some(now);
        task.duration_seconds = started_at.map(|s| (now - s).num_milliseconds() as f64 / 1000.0);
        task.files_created = files_created;
        task.files_modified = files_modified;
        self.counters.completed_count += 1;
        self.push_event(EventType::TaskCompleted, json!({ "task_id": id }));
        self.mark_checkpoint_entry(id, CheckpointEntryStatus::Success);
        self.refresh_ready_statuses();
        Ok(())
    }

    /// `running -> failed`.
    pub fn fail_task(
        &mut self,
        id: &str,
        error: String,
        category: Option<String>,
        retryable: Option<bool>,
    ) -> Result<()> {
        let task = self.require_task(id)?;
        if task.status != TaskStatus::Running {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: task.status.to_string(),
                to: "failed".to_string(),
            }
            .into());
        }
        let task = self.tasks.get_mut(id).expect("checked by require_task");
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error = Some(error.clone());
        task.error_category = category.clone();
        task.retryable = retryable;
        self.counters.failed_count += 1;
        self.push_event(
            EventType::TaskFailed,
            json!({ "task_id": id, "error": error, "category": category }),
        );
        self.mark_checkpoint_entry(id, CheckpointEntryStatus::Failed);
        Ok(())
    }

    /// `failed -> pending`. Resets attempts' event trail (I-6: attempts
    /// counts `task_started` events since the *last* retry).
    pub fn retry_task(&mut self, id: &str) -> Result<()> {
        let task = self.require_task(id)?;
        if task.status != TaskStatus::Failed {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: task.status.to_string(),
                to: "pending".to_string(),
            }
            .into());
        }
        self.counters.failed_count = self.counters.failed_count.saturating_sub(1);
        let task = self.tasks.get_mut(id).expect("checked by require_task");
        task.status = TaskStatus::Pending;
        task.error = None;
        task.error_category = None;
        task.retryable = None;
        task.started_at = None;
        task.completed_at = None;
        self.push_event(EventType::TaskRetried, json!({ "task_id": id }));
        self.refresh_ready_statuses();
        Ok(())
    }

    /// Any non-terminal state `-> skipped`.
    pub fn skip_task(&mut self, id: &str, reason: Option<String>) -> Result<()> {
        let task = self.require_task(id)?;
        if task.status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: task.status.to_string(),
                to: "skipped".to_string(),
            }
            .into());
        }
        let task = self.tasks.get_mut(id).expect("checked by require_task");
        task.status = TaskStatus::Skipped;
        self.counters.skipped_count += 1;
        self.push_event(
            EventType::TaskSkipped,
            json!({ "task_id": id, "reason": reason }),
        );
        self.mark_checkpoint_entry(id, CheckpointEntryStatus::Success);
        self.refresh_ready_statuses();
        Ok(())
    }

    /// Record a verification-ledger entry on a task (C7).
    pub fn record_verification(&mut self, id: &str, verification: Verification) -> Result<()> {
        let task = self.require_task(id)?;
        let verdict = verification.verdict;
        let _ = task;
        let task = self.tasks.get_mut(id).expect("checked by require_task");
        task.verification = Some(verification);
        self.push_event(
            EventType::VerificationRecorded,
            json!({ "task_id": id, "verdict": verdict }),
        );
        Ok(())
    }

    /// Log token/cost usage against the running aggregate counters.
    pub fn log_tokens(&mut self, task_id: &str, tokens: u64, cost: f64) {
        self.counters.total_tokens += tokens;
        self.counters.total_cost += cost;
        self.push_event(
            EventType::TokensLogged,
            json!({ "task_id": task_id, "tokens": tokens, "cost": cost }),
        );
    }

    /// I-4: set `halt.requested`. Idempotent.
    pub fn request_halt(&mut self, reason: Option<String>, requested_by: Option<String>) {
        self.halt = Some(Halt {
            requested: true,
            reason: reason.clone(),
            requested_at: Some(Utc::now()),
            requested_by: requested_by.clone(),
        });
        self.push_event(
            EventType::HaltRequested,
            json!({ "reason": reason, "requested_by": requested_by }),
        );
    }

    /// Clear the halt flag. Errors if no halt is currently requested.
    pub fn resume(&mut self) -> Result<()> {
        if !self.halt_requested() {
            return Err(StateError::Invariant {
                name: "I-4",
                detail: "resume called with no halt in effect".to_string(),
            }
            .into());
        }
        self.halt = None;
        self.push_event(EventType::ExecutionResumed, json!({}));
        Ok(())
    }

    /// Create a checkpoint for a freshly-reserved batch. Errors if a
    /// checkpoint is already active (at most one at a time, spec.md §3).
    pub fn create_checkpoint(&mut self, batch: Vec<String>) -> Result<()> {
        if self.checkpoint.is_some() {
            return Err(StateError::Invariant {
                name: "I-5",
                detail: "a checkpoint is already active".to_string(),
            }
            .into());
        }
        for id in &batch {
            self.require_task(id)?;
        }
        self.push_event(
            EventType::CheckpointCreated,
            json!({ "batch": batch }),
        );
        self.checkpoint = Some(Checkpoint::new(batch));
        Ok(())
    }

    fn mark_checkpoint_entry(&mut self, id: &str, status: CheckpointEntryStatus) {
        let Some(cp) = self.checkpoint.as_mut() else {
            return;
        };
        if !cp.per_task_result.contains_key(id) {
            return;
        }
        cp.per_task_result.insert(id.to_string(), status);
        self.push_event(
            EventType::CheckpointUpdated,
            json!({ "task_id": id, "status": status }),
        );
        if self.checkpoint.as_ref().is_some_and(Checkpoint::all_terminal) {
            self.push_event(EventType::CheckpointCompleted, json!({}));
        }
    }

    /// Mark a still-running task `orphaned` on crash recovery when no
    /// result file was found for it (§4.8 crash recovery).
    pub fn mark_orphaned(&mut self, id: &str) -> Result<()> {
        self.require_task(id)?;
        self.mark_checkpoint_entry(id, CheckpointEntryStatus::Orphaned);
        Ok(())
    }

    /// Clear a fully-resolved checkpoint. Errors if any entry remains
    /// unresolved.
    pub fn clear_checkpoint(&mut self) -> Result<()> {
        match &self.checkpoint {
            None => Ok(()),
            Some(cp) if cp.all_terminal() => {
                self.checkpoint = None;
                self.push_event(EventType::CheckpointCleared, json!({}));
                Ok(())
            }
            Some(_) => Err(StateError::Invariant {
                name: "I-5",
                detail: "checkpoint has unresolved entries".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc_with_tasks(n: usize) -> StateDocument {
        let mut doc = StateDocument::new(PathBuf::from("/tmp/proj"));
        for i in 1..=n {
            let id = format!("T{i:03}");
            doc.load_task(Task::new(&id, "do thing", 1, PathBuf::from(format!("tasks/{id}.json"))))
                .unwrap();
        }
        doc
    }

    #[test]
    fn load_task_rejects_dangling_dependency() {
        let mut doc = StateDocument::new(PathBuf::from("/tmp/proj"));
        let mut t = Task::new("T001", "a", 1, PathBuf::from("tasks/T001.json"));
        t.depends_on.push("T999".into());
        let err = doc.load_task(t).unwrap_err();
        assert_eq!(err.code(), "INVARIANT");
    }

    #[test]
    fn start_task_requires_active_checkpoint_membership() {
        let mut doc = doc_with_tasks(1);
        doc.refresh_ready_statuses();
        let err = doc.start_task("T001").unwrap_err();
        assert_eq!(err.code(), "INVARIANT");
    }

    #[test]
    fn full_lifecycle_pending_to_complete_updates_counters() {
        let mut doc = doc_with_tasks(1);
        doc.refresh_ready_statuses();
        doc.create_checkpoint(vec!["T001".into()]).unwrap();
        doc.start_task("T001").unwrap();
        assert_eq!(doc.tasks["T001"].status, TaskStatus::Running);
        assert_eq!(doc.tasks["T001"].attempts, 1);

        doc.complete_task("T001", vec!["a.rs".into()], vec![]).unwrap();
        assert_eq!(doc.tasks["T001"].status, TaskStatus::Complete);
        assert_eq!(doc.counters.completed_count, 1);
        assert_eq!(
            doc.checkpoint.as_ref().unwrap().per_task_result["T001"],
            CheckpointEntryStatus::Success
        );
        assert!(doc.checkpoint.as_ref().unwrap().all_terminal());
        doc.clear_checkpoint().unwrap();
        assert!(doc.checkpoint.is_none());
    }

    #[test]
    fn halt_requested_blocks_start_task() {
        let mut doc = doc_with_tasks(1);
        doc.refresh_ready_statuses();
        doc.create_checkpoint(vec!["T001".into()]).unwrap();
        doc.request_halt(Some("operator request".into()), None);
        let err = doc.start_task("T001").unwrap_err();
        assert!(matches!(err, TaskerError::Halted));
    }

    #[test]
    fn retry_resets_to_pending_and_decrements_failed_count() {
        let mut doc = doc_with_tasks(1);
        doc.refresh_ready_statuses();
        doc.create_checkpoint(vec!["T001".into()]).unwrap();
        doc.start_task("T001").unwrap();
        doc.fail_task("T001", "boom".into(), Some("execution".into()), Some(true))
            .unwrap();
        assert_eq!(doc.counters.failed_count, 1);

        doc.retry_task("T001").unwrap();
        assert_eq!(doc.tasks["T001"].status, TaskStatus::Pending);
        assert_eq!(doc.counters.failed_count, 0);
        assert!(doc.tasks["T001"].error.is_none());
        assert!(doc.tasks["T001"].started_at.is_none());
        assert!(doc.tasks["T001"].completed_at.is_none());
    }

    #[test]
    fn skip_satisfies_dependents_but_complete_and_skip_are_distinct() {
        let mut doc = doc_with_tasks(2);
        doc.tasks.get_mut("T002").unwrap().depends_on.push("T001".into());
        doc.refresh_ready_statuses();
        assert_eq!(doc.tasks["T001"].status, TaskStatus::Ready);
        assert_eq!(doc.tasks["T002"].status, TaskStatus::Pending);

        doc.skip_task("T001", Some("not needed".into())).unwrap();
        doc.refresh_ready_statuses();
        assert_eq!(doc.tasks["T002"].status, TaskStatus::Ready);
        assert_eq!(doc.counters.skipped_count, 1);
    }

    #[test]
    fn resume_without_halt_is_an_error() {
        let mut doc = doc_with_tasks(1);
        assert!(doc.resume().is_err());
    }

    #[test]
    fn create_checkpoint_rejects_second_active_checkpoint() {
        let mut doc = doc_with_tasks(1);
        doc.create_checkpoint(vec!["T001".into()]).unwrap();
        let err = doc.create_checkpoint(vec!["T001".into()]).unwrap_err();
        assert_eq!(err.code(), "INVARIANT");
    }
}
