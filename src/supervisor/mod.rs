//! Execution Supervisor (C6): the bounded-parallelism batch cycle that
//! reserves ready tasks, dispatches worker processes against their
//! execution bundles, and reconciles the results back into state.
//!
//! Worker dispatch follows the teacher's own subprocess pattern in its
//! swarm executor (`tokio::process::Command`, piped stdio, collected via
//! a join set instead of a single spawn), generalized from "one Claude
//! process driven by stdin/stdout" to "one worker process per task,
//! handed a bundle path, awaited for its result file."

use crate::bundle::{self, Bundle, BundleInputs, CapabilityMap, PhysicalMap, ResultFile, ResultStatus};
use crate::errors::TaskerError;
use crate::graph::TaskGraph;
use crate::phase_machine::gates::GateConfig;
use crate::phase_machine::{self, SpecCoverageInputs};
use crate::state::StateDocument;
use crate::storage::Store;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinSet;

/// Default bound on concurrently-dispatched workers (spec.md §4.6).
pub const DEFAULT_MAX_PARALLEL: usize = 3;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_parallel: usize,
    pub worker_cmd: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            worker_cmd: "tasker-worker".to_string(),
        }
    }
}

/// What a single `run_cycle` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Halt was already requested; nothing was dispatched.
    Halted,
    /// The ready set was empty and the phase advanced.
    Advanced,
    /// The ready set was empty and the phase could not advance either.
    Idle,
    /// A batch of these task ids was dispatched and reconciled.
    Dispatched(Vec<String>),
}

/// Artifact inputs a batch cycle needs to build bundles, loaded once by
/// the caller from `artifacts/` and held for the run's lifetime.
pub struct Artifacts {
    pub capability_map: CapabilityMap,
    pub capability_map_raw: Vec<u8>,
    pub physical_map: PhysicalMap,
    pub physical_map_raw: Vec<u8>,
    pub constraints: Option<Value>,
    pub constraints_raw: Vec<u8>,
}

/// Presence of the cooperative-halt sentinel file (spec.md §4.6).
pub fn stop_file_present(working_dir: &Path) -> bool {
    working_dir.join("STOP").exists()
}

/// Run one batch cycle against `store`'s state document. `bundles_dir`
/// is where bundle/result files are read and written; `working_dir` is
/// the `.tasker/` directory the `STOP` sentinel lives in.
pub async fn run_cycle(
    store: &Store,
    working_dir: &Path,
    bundles_dir: &Path,
    artifacts: &Artifacts,
    cfg: &SupervisorConfig,
    gate_cfg: &GateConfig,
    coverage: &SpecCoverageInputs,
) -> Result<CycleOutcome, TaskerError> {
    let doc = store.load()?;
    if doc.halt_requested() || stop_file_present(working_dir) {
        return Ok(CycleOutcome::Halted);
    }

    let graph = TaskGraph::build(&doc.tasks)?;
    let ready = graph.ready_set(&doc.tasks, doc.checkpoint.as_ref());

    if ready.is_empty() {
        let mut outcome = CycleOutcome::Idle;
        store.with_lock(|doc| {
            match phase_machine::advance(doc, Some(&graph), None, coverage, gate_cfg) {
                Ok(()) => {
                    outcome = CycleOutcome::Advanced;
                    Ok(())
                }
                Err(_) => Ok(()),
            }
        })?;
        return Ok(outcome);
    }

    let batch: Vec<String> = ready.into_iter().take(cfg.max_parallel).collect();

    let mut surviving = Vec::new();
    let mut bundles: Vec<Bundle> = Vec::new();
    store.with_lock(|doc| {
        for id in &batch {
            match build_and_verify_bundle(doc, id, working_dir, artifacts) {
                Ok(bundle) => {
                    surviving.push(id.clone());
                    bundles.push(bundle);
                }
                Err(e) => {
                    tracing::warn!(task = %id, error = %e, "bundle integrity check failed, failing task");
                    doc.fail_task(
                        id,
                        e.to_string(),
                        Some("dependency".to_string()),
                        Some(false),
                    )?;
                }
            }
        }
        Ok(())
    })?;

    if surviving.is_empty() {
        tracing::info!("batch empty after integrity filtering");
        return Ok(CycleOutcome::Dispatched(Vec::new()));
    }

    for bundle in &bundles {
        let path = bundle::bundle_path(bundles_dir, &bundle.task_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let raw = serde_json::to_string_pretty(bundle).map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
        std::fs::write(&path, raw).map_err(|e| crate::errors::IoError::WriteFail { path: path.clone(), source: e })?;
    }

    store.with_lock(|doc| {
        doc.create_checkpoint(surviving.clone())?;
        for id in &surviving {
            doc.start_task(id)?;
        }
        Ok(())
    })?;

    let mut join_set: JoinSet<(String, Result<(), TaskerError>)> = JoinSet::new();
    for id in &surviving {
        let bundle_path = bundle::bundle_path(bundles_dir, id);
        let worker_cmd = cfg.worker_cmd.clone();
        let id = id.clone();
        join_set.spawn(async move {
            let result = dispatch_worker(&worker_cmd, &bundle_path).await;
            (id, result)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((id, Ok(()))) => tracing::debug!(task = %id, "worker exited"),
            Ok((id, Err(e))) => tracing::warn!(task = %id, error = %e, "worker failed to launch"),
            Err(e) => tracing::warn!(error = %e, "worker task panicked"),
        }
    }

    store.with_lock(|doc| {
        for id in &surviving {
            reconcile_one(doc, id, bundles_dir)?;
        }
        Ok(())
    })?;

    Ok(CycleOutcome::Dispatched(surviving))
}

fn build_one_bundle(doc: &StateDocument, id: &str, artifacts: &Artifacts) -> Result<Bundle, TaskerError> {
    let task = doc.tasks.get(id).ok_or_else(|| crate::errors::TaskError::UnknownId(id.to_string()))?;
    let task_definition_raw = std::fs::read(&task.file).unwrap_or_default();
    let target_dir = doc.target_dir.to_string_lossy().to_string();

    bundle::build(BundleInputs {
        task,
        tasks: &doc.tasks,
        capability_map: &artifacts.capability_map,
        capability_map_raw: &artifacts.capability_map_raw,
        physical_map: &artifacts.physical_map,
        physical_map_raw: &artifacts.physical_map_raw,
        constraints: artifacts.constraints.as_ref(),
        constraints_raw: &artifacts.constraints_raw,
        task_definition_raw: &task_definition_raw,
        target_dir: &target_dir,
    })
}

/// Build a task's bundle, then check it against artifact files as they
/// stand on disk right now. A cycle's `artifacts` snapshot is loaded
/// once up front, so a concurrent edit to `capability-map.json` or
/// `physical-map.json` between that load and this dispatch shows up
/// here as drift. The first two checks failing this way are fatal; a
/// detected drift instead triggers one re-load-and-rebuild before
/// giving up (spec.md §7, `ARTIFACT_DRIFT`).
fn build_and_verify_bundle(
    doc: &StateDocument,
    id: &str,
    working_dir: &Path,
    artifacts: &Artifacts,
) -> Result<Bundle, TaskerError> {
    let mut bundle = build_one_bundle(doc, id, artifacts)?;
    bundle::verify(&bundle)?;

    if let Some(current) = fresh_artifact_checksums(working_dir, doc, id)? {
        if let bundle::IntegrityOutcome::ArtifactDrift(names) = bundle::verify_artifacts(&bundle, &current)? {
            tracing::warn!(task = %id, drifted = ?names, "artifact drift detected, regenerating bundle once");
            let fresh = load_artifacts(working_dir)?;
            bundle = build_one_bundle(doc, id, &fresh)?;
            bundle::verify(&bundle)?;
            if let Some(current) = fresh_artifact_checksums(working_dir, doc, id)? {
                if let bundle::IntegrityOutcome::ArtifactDrift(names) = bundle::verify_artifacts(&bundle, &current)? {
                    return Err(crate::errors::BundleError::ArtifactDrift {
                        task: id.to_string(),
                        artifact: names.join(", "),
                    }
                    .into());
                }
            }
        }
    }

    Ok(bundle)
}

/// Recompute the artifact checksums a bundle would be built with right
/// now, directly from disk, without going through [`load_artifacts`]'s
/// deserialization (drift is a byte-level concern).
fn fresh_artifact_checksums(
    working_dir: &Path,
    doc: &StateDocument,
    id: &str,
) -> Result<Option<crate::bundle::ArtifactChecksums>, TaskerError> {
    let Some(task) = doc.tasks.get(id) else { return Ok(None) };
    let artifacts_dir = working_dir.join("artifacts");
    let capability_map_raw = read_or_default(&artifacts_dir.join("capability-map.json"), br#"{"behaviors":[]}"#)?;
    let physical_map_raw = read_or_default(&artifacts_dir.join("physical-map.json"), br#"{"entries":[]}"#)?;
    let constraints_path = artifacts_dir.join("constraints.json");
    let constraints_raw = if constraints_path.exists() {
        std::fs::read(&constraints_path).map_err(|e| crate::errors::IoError::ReadFail {
            path: constraints_path.clone(),
            source: e,
        })?
    } else {
        Vec::new()
    };
    let task_definition_raw = std::fs::read(&task.file).unwrap_or_default();

    Ok(Some(crate::bundle::ArtifactChecksums {
        capability_map: bundle::checksum_bytes(&capability_map_raw),
        physical_map: bundle::checksum_bytes(&physical_map_raw),
        constraints: bundle::checksum_bytes(&constraints_raw),
        task_definition: bundle::checksum_bytes(&task_definition_raw),
    }))
}

async fn dispatch_worker(worker_cmd: &str, bundle_path: &Path) -> Result<(), TaskerError> {
    let mut cmd = Command::new(worker_cmd);
    cmd.arg(bundle_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit());

    let status = cmd
        .status()
        .await
        .map_err(|e| TaskerError::Other(anyhow::anyhow!("failed to spawn worker {worker_cmd}: {e}")))?;

    if !status.success() {
        tracing::warn!(worker = %worker_cmd, status = %status, "worker process exited non-zero; result file will be checked regardless");
    }
    Ok(())
}

fn reconcile_one(doc: &mut StateDocument, id: &str, bundles_dir: &Path) -> Result<(), TaskerError> {
    let result_path = bundle::result_path(bundles_dir, id);
    if !result_path.exists() {
        doc.mark_orphaned(id)?;
        return Ok(());
    }
    let raw = std::fs::read_to_string(&result_path).map_err(|e| crate::errors::IoError::ReadFail {
        path: result_path.clone(),
        source: e,
    })?;
    match serde_json::from_str::<ResultFile>(&raw) {
        Ok(result) => apply_result(doc, &result),
        Err(_) => {
            doc.mark_orphaned(id)?;
            Ok(())
        }
    }
}

/// Apply a worker's result file to the task it names: success completes
/// the task with its declared files, failure fails it with the worker's
/// error payload. Also records any verification block into the task.
pub fn apply_result(doc: &mut StateDocument, result: &ResultFile) -> Result<(), TaskerError> {
    match result.status {
        ResultStatus::Success => {
            doc.complete_task(
                &result.task_id,
                result.files.created.clone(),
                result.files.modified.clone(),
            )?;
        }
        ResultStatus::Failed => {
            let error = result.error.clone().unwrap_or(crate::bundle::ResultError {
                category: "execution".to_string(),
                message: "worker reported failure with no error payload".to_string(),
                retryable: true,
            });
            doc.fail_task(&result.task_id, error.message, Some(error.category), Some(error.retryable))?;
        }
    }

    if let Some(verification) = &result.verification {
        if let Some(task) = doc.tasks.get_mut(&result.task_id) {
            task.verification = Some(verification.clone());
        }
        doc.push_event(
            crate::state::EventType::VerificationRecorded,
            serde_json::json!({ "task_id": result.task_id }),
        );
    }

    Ok(())
}

/// Load the artifacts a batch cycle needs from `<working_dir>/artifacts/`.
/// `constraints.json` is optional; its absence is not an error.
pub fn load_artifacts(working_dir: &Path) -> Result<Artifacts, TaskerError> {
    let artifacts_dir = working_dir.join("artifacts");

    let capability_map_raw = read_or_default(&artifacts_dir.join("capability-map.json"), br#"{"behaviors":[]}"#)?;
    let capability_map: CapabilityMap = serde_json::from_slice(&capability_map_raw)
        .map_err(|e| TaskerError::Other(anyhow::anyhow!("capability-map.json: {e}")))?;

    let physical_map_raw = read_or_default(&artifacts_dir.join("physical-map.json"), br#"{"entries":[]}"#)?;
    let physical_map: PhysicalMap = serde_json::from_slice(&physical_map_raw)
        .map_err(|e| TaskerError::Other(anyhow::anyhow!("physical-map.json: {e}")))?;

    let constraints_path = artifacts_dir.join("constraints.json");
    let constraints_raw = if constraints_path.exists() {
        std::fs::read(&constraints_path).map_err(|e| crate::errors::IoError::ReadFail {
            path: constraints_path.clone(),
            source: e,
        })?
    } else {
        Vec::new()
    };
    let constraints = if constraints_raw.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&constraints_raw).map_err(|e| TaskerError::Other(anyhow::anyhow!("constraints.json: {e}")))?)
    };

    Ok(Artifacts {
        capability_map,
        capability_map_raw,
        physical_map,
        physical_map_raw,
        constraints,
        constraints_raw,
    })
}

fn read_or_default(path: &Path, default: &[u8]) -> Result<Vec<u8>, TaskerError> {
    if path.exists() {
        std::fs::read(path).map_err(|e| crate::errors::IoError::ReadFail { path: path.to_path_buf(), source: e }.into())
    } else {
        Ok(default.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{ResultError, ResultFiles};
    use crate::state::{StateDocument, Task};
    use chrono::Utc;
    use std::path::PathBuf;

    fn success_result(task_id: &str) -> ResultFile {
        ResultFile {
            task_id: task_id.to_string(),
            name: "do thing".to_string(),
            status: ResultStatus::Success,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            files: ResultFiles {
                created: vec!["src/new.rs".to_string()],
                modified: vec![],
            },
            verification: None,
            error: None,
            notes: None,
        }
    }

    #[test]
    fn apply_result_success_completes_task() {
        let mut doc = StateDocument::new(PathBuf::from("/tmp"));
        doc.load_task(Task::new("T001", "n", 1, PathBuf::from("x"))).unwrap();
        doc.refresh_ready_statuses();
        doc.create_checkpoint(vec!["T001".to_string()]).unwrap();
        doc.start_task("T001").unwrap();

        apply_result(&mut doc, &success_result("T001")).unwrap();
        assert_eq!(doc.tasks["T001"].status, crate::state::TaskStatus::Complete);
        assert_eq!(doc.tasks["T001"].files_created, vec!["src/new.rs".to_string()]);
    }

    #[test]
    fn apply_result_failed_uses_default_error_when_missing() {
        let mut doc = StateDocument::new(PathBuf::from("/tmp"));
        doc.load_task(Task::new("T001", "n", 1, PathBuf::from("x"))).unwrap();
        doc.refresh_ready_statuses();
        doc.create_checkpoint(vec!["T001".to_string()]).unwrap();
        doc.start_task("T001").unwrap();

        let mut result = success_result("T001");
        result.status = ResultStatus::Failed;
        result.error = None;
        apply_result(&mut doc, &result).unwrap();
        assert_eq!(doc.tasks["T001"].status, crate::state::TaskStatus::Failed);
        assert!(doc.tasks["T001"].error.is_some());
    }

    #[test]
    fn apply_result_failed_with_payload_records_category() {
        let mut doc = StateDocument::new(PathBuf::from("/tmp"));
        doc.load_task(Task::new("T001", "n", 1, PathBuf::from("x"))).unwrap();
        doc.refresh_ready_statuses();
        doc.create_checkpoint(vec!["T001".to_string()]).unwrap();
        doc.start_task("T001").unwrap();

        let mut result = success_result("T001");
        result.status = ResultStatus::Failed;
        result.error = Some(ResultError {
            category: "logic".to_string(),
            message: "assertion failed".to_string(),
            retryable: true,
        });
        apply_result(&mut doc, &result).unwrap();
        assert_eq!(doc.tasks["T001"].error_category.as_deref(), Some("logic"));
    }

    #[test]
    fn stop_file_present_detects_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!stop_file_present(dir.path()));
        std::fs::write(dir.path().join("STOP"), b"").unwrap();
        assert!(stop_file_present(dir.path()));
    }

    #[tokio::test]
    async fn dispatch_worker_runs_a_real_process() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("bundle.json");
        std::fs::write(&bundle_path, b"{}").unwrap();
        let result = dispatch_worker("true", &bundle_path).await;
        assert!(result.is_ok());
    }
}
