//! `init`, `status`, `advance`, `halt|resume|check-halt`,
//! `record-verification`, `metrics` (§6, §4.4, §4.7).

use super::Context;
use crate::config::Config;
use crate::errors::TaskerError;
use crate::graph::TaskGraph;
use crate::phase_machine::{self, SpecCoverageInputs, SpecReviewVerdict};
use crate::storage::Store;
use crate::verification::{ActualOutcome, CalibrationLedger};
use std::path::PathBuf;

pub fn cmd_init(target_dir: Option<PathBuf>) -> Result<(), TaskerError> {
    let config = Config::load().map_err(TaskerError::Other)?;
    let target = target_dir.unwrap_or_else(|| {
        config
            .working_dir
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let store = Store::new(&config.working_dir)
        .with_lock_timeout(std::time::Duration::from_secs(config.lock_timeout_secs));
    store.init(target.clone())?;
    println!("initialized {} (target: {})", config.working_dir.display(), target.display());
    Ok(())
}

pub fn cmd_status(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    println!("phase: {}", doc.phase.current.as_str());
    println!("tasks: {}", doc.tasks.len());
    println!(
        "completed={} failed={} skipped={}",
        doc.counters.completed_count, doc.counters.failed_count, doc.counters.skipped_count
    );
    println!("halted: {}", doc.halt_requested());
    if let Some(cp) = &doc.checkpoint {
        println!("checkpoint: {} task(s), all_terminal={}", cp.batch.len(), cp.all_terminal());
    }
    Ok(())
}

pub fn cmd_advance(ctx: &Context, spec_review: Option<SpecReviewVerdict>) -> Result<(), TaskerError> {
    let artifacts = crate::supervisor::load_artifacts(&ctx.config.working_dir)?;
    let mut new_phase = None;
    ctx.store.with_lock(|doc| {
        let graph = TaskGraph::build(&doc.tasks)?;
        let all_behaviors = artifacts.capability_map.behaviors.iter().map(|b| b.id.clone()).collect();
        let steel_thread_behaviors = doc
            .tasks
            .values()
            .filter(|t| t.steel_thread)
            .flat_map(|t| t.behaviors.iter().cloned())
            .collect();
        let coverage = SpecCoverageInputs { all_behaviors, steel_thread_behaviors };
        phase_machine::advance(doc, Some(&graph), spec_review, &coverage, &ctx.config.gate_config)?;
        new_phase = Some(doc.phase.current);
        Ok(())
    })?;
    println!("advanced to {}", new_phase.expect("set on success").as_str());
    Ok(())
}

pub fn cmd_halt(ctx: &Context, reason: Option<String>) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| {
        doc.request_halt(reason.clone(), None);
        Ok(())
    })?;
    println!("halt requested");
    Ok(())
}

pub fn cmd_resume(ctx: &Context) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| doc.resume())?;
    println!("resumed");
    Ok(())
}

pub fn cmd_check_halt(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    if doc.halt_requested() || crate::supervisor::stop_file_present(&ctx.config.working_dir) {
        return Err(TaskerError::Halted);
    }
    println!("not halted");
    Ok(())
}

fn load_ledger(ctx: &Context) -> Result<CalibrationLedger, TaskerError> {
    let path = ctx.calibration_path();
    if !path.exists() {
        return Ok(CalibrationLedger::default());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| crate::errors::IoError::ReadFail {
        path: path.clone(),
        source: e,
    })?;
    serde_json::from_str(&raw).map_err(|e| TaskerError::Other(anyhow::anyhow!("{}: {e}", path.display())))
}

fn save_ledger(ctx: &Context, ledger: &CalibrationLedger) -> Result<(), TaskerError> {
    let path = ctx.calibration_path();
    let raw = serde_json::to_string_pretty(ledger).map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
    std::fs::write(&path, raw).map_err(|e| crate::errors::IoError::WriteFail { path: path.clone(), source: e }.into())
}

pub fn cmd_record_verification(ctx: &Context, task_id: String, actual_outcome: ActualOutcome) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let task = doc
        .tasks
        .get(&task_id)
        .ok_or_else(|| crate::errors::TaskError::UnknownId(task_id.clone()))?;
    let verification = task
        .verification
        .as_ref()
        .ok_or_else(|| TaskerError::Other(anyhow::anyhow!("task {task_id} has no recorded verification")))?;

    let mut ledger = load_ledger(ctx)?;
    ledger.record(task_id.clone(), verification.verdict, verification.recommendation, actual_outcome);
    save_ledger(ctx, &ledger)?;
    println!("recorded calibration entry for {task_id}");
    Ok(())
}

pub fn cmd_metrics(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let ledger = load_ledger(ctx)?;
    let metrics = crate::verification::compute_metrics(&doc, &ledger);
    let json = serde_json::to_string_pretty(&metrics).map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
    println!("{json}");
    Ok(())
}
