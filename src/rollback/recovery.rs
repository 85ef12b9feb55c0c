//! Corrupt-document recovery and crash/orphan reconciliation (§4.8).

use crate::errors::{IoError, TaskerError};
use crate::state::{EventType, StateDocument, Task, TaskStatus};
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub data_lost: Vec<String>,
    pub backup_path: Option<std::path::PathBuf>,
}

/// Recover from an unparseable state document: back it up, recover
/// whatever fields a partial parse can salvage, reseed tasks from
/// `tasks/*.json` when the document's own task map is unrecoverable,
/// and recompute aggregate counters.
pub fn recover_corrupt_state(
    state_path: &Path,
    reason: String,
) -> Result<(StateDocument, RecoveryReport), TaskerError> {
    let mut report = RecoveryReport::default();
    report.data_lost.push(format!("unparseable document: {reason}"));

    let raw = std::fs::read_to_string(state_path).unwrap_or_default();

    let backup_path = state_path.with_extension(format!(
        "json.corrupted.{}",
        Utc::now().format("%Y%m%dT%H%M%S%.fZ")
    ));
    std::fs::write(&backup_path, &raw).map_err(|e| IoError::WriteFail {
        path: backup_path.clone(),
        source: e,
    })?;
    report.backup_path = Some(backup_path);

    let partial: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

    let target_dir = partial
        .get("target_dir")
        .and_then(Value::as_str)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| {
            report.data_lost.push("target_dir unrecoverable, defaulted".to_string());
            state_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        });

    let mut doc = StateDocument::new(target_dir);

    let recovered_tasks: Option<std::collections::BTreeMap<String, Task>> = partial
        .get("tasks")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    match recovered_tasks {
        Some(tasks) if !tasks.is_empty() => {
            doc.tasks = tasks;
        }
        _ => {
            report.data_lost.push("tasks map unrecoverable, reseeding from tasks/".to_string());
            if let Some(working_dir) = state_path.parent() {
                reseed_tasks_from_disk(&mut doc, working_dir);
            }
        }
    }

    recompute_counters(&mut doc);
    doc.push_event(
        EventType::StateRecovered,
        serde_json::json!({ "data_lost": report.data_lost }),
    );

    Ok((doc, report))
}

fn reseed_tasks_from_disk(doc: &mut StateDocument, working_dir: &Path) {
    let tasks_dir = working_dir.join("tasks");
    if !tasks_dir.is_dir() {
        return;
    }
    for entry in WalkDir::new(&tasks_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let Ok(raw) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        if let Ok(task) = serde_json::from_str::<Task>(&raw) {
            doc.tasks.insert(task.id.clone(), task);
        }
    }
}

fn recompute_counters(doc: &mut StateDocument) {
    doc.counters.completed_count = doc.tasks.values().filter(|t| t.status == TaskStatus::Complete).count();
    doc.counters.failed_count = doc.tasks.values().filter(|t| t.status == TaskStatus::Failed).count();
    doc.counters.skipped_count = doc.tasks.values().filter(|t| t.status == TaskStatus::Skipped).count();
}

/// Disposition an operator chooses for an orphaned checkpoint entry on
/// crash recovery (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanDisposition {
    Retry,
    Skip,
}

/// Reconcile a crash-recovered checkpoint: for each batch id, apply the
/// result file if one exists and is well-formed, otherwise mark the
/// entry orphaned. Returns the ids that were left orphaned.
pub fn reconcile_checkpoint(
    doc: &mut StateDocument,
    bundles_dir: &Path,
) -> Result<Vec<String>, TaskerError> {
    let Some(checkpoint) = doc.checkpoint.clone() else {
        return Ok(Vec::new());
    };
    let mut orphaned = Vec::new();
    for id in checkpoint.batch.clone() {
        let result_path = crate::bundle::result_path(bundles_dir, &id);
        if result_path.exists() {
            if let Ok(raw) = std::fs::read_to_string(&result_path) {
                if let Ok(result) = serde_json::from_str::<crate::bundle::ResultFile>(&raw) {
                    crate::supervisor::apply_result(doc, &result)?;
                    continue;
                }
            }
        }
        doc.mark_orphaned(&id)?;
        orphaned.push(id);
    }
    Ok(orphaned)
}

/// Apply an operator's disposition to an orphaned task.
pub fn resolve_orphan(
    doc: &mut StateDocument,
    id: &str,
    disposition: OrphanDisposition,
) -> Result<(), TaskerError> {
    match disposition {
        OrphanDisposition::Retry => {
            doc.fail_task(
                id,
                "orphaned: no result file found".to_string(),
                Some("execution".to_string()),
                Some(true),
            )?;
            doc.retry_task(id)
        }
        OrphanDisposition::Skip => doc.skip_task(id, Some("orphaned, operator chose skip".to_string())),
    }
}
