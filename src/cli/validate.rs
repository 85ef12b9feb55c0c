//! `validate artifact|tasks|planning-gates|dag` (§6).

use super::Context;
use crate::errors::TaskerError;
use crate::graph::TaskGraph;
use crate::phase_machine::gates;
use crate::phase_machine::SpecCoverageInputs;
use clap::Subcommand;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ValidateCommand {
    /// Schema-validate one artifact file against its registered kind.
    Artifact {
        /// `task`, `capability-map`, `physical-map`, `bundle`, or `result`.
        kind: String,
        path: PathBuf,
    },
    /// Schema-validate every task definition file under `tasks/`.
    Tasks,
    /// Run the spec-coverage, phase-leakage, and acceptance-criterion
    /// planning gates against the currently loaded tasks.
    PlanningGates,
    /// Build the task graph and print a topological order, or the
    /// offending cycle if one exists.
    Dag,
}

pub fn dispatch(ctx: &Context, cmd: ValidateCommand) -> Result<(), TaskerError> {
    match cmd {
        ValidateCommand::Artifact { kind, path } => cmd_artifact(&kind, &path),
        ValidateCommand::Tasks => cmd_tasks(ctx),
        ValidateCommand::PlanningGates => cmd_planning_gates(ctx),
        ValidateCommand::Dag => cmd_dag(ctx),
    }
}

fn cmd_artifact(kind: &str, path: &std::path::Path) -> Result<(), TaskerError> {
    let raw = std::fs::read_to_string(path).map_err(|e| crate::errors::IoError::ReadFail {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| TaskerError::Other(anyhow::anyhow!("{}: {e}", path.display())))?;
    crate::schema::default_registry().validate(kind, &value)?;
    println!("{} is a valid {kind}", path.display());
    Ok(())
}

fn cmd_tasks(ctx: &Context) -> Result<(), TaskerError> {
    let tasks_dir = ctx.tasks_dir();
    if !tasks_dir.exists() {
        println!("no tasks/ directory, nothing to validate");
        return Ok(());
    }
    let registry = crate::schema::default_registry();
    let mut offenders = Vec::new();
    for entry in std::fs::read_dir(&tasks_dir)
        .map_err(|e| crate::errors::IoError::ReadFail { path: tasks_dir.clone(), source: e })?
    {
        let entry = entry.map_err(|e| crate::errors::IoError::ReadFail { path: tasks_dir.clone(), source: e })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| crate::errors::IoError::ReadFail {
            path: path.clone(),
            source: e,
        })?;
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(_) => {
                offenders.push(path.display().to_string());
                continue;
            }
        };
        if registry.validate("task", &value).is_err() {
            offenders.push(path.display().to_string());
        }
    }
    if offenders.is_empty() {
        println!("all task definitions are schema-valid");
        Ok(())
    } else {
        for path in &offenders {
            println!("invalid: {path}");
        }
        Err(crate::errors::SchemaError::ValidationFailed {
            artifact: "tasks".to_string(),
            errors: offenders,
        }
        .into())
    }
}

fn cmd_planning_gates(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let artifacts = crate::supervisor::load_artifacts(&ctx.config.working_dir)?;

    let all_behaviors: BTreeSet<String> = artifacts.capability_map.behaviors.iter().map(|b| b.id.clone()).collect();
    let steel_thread_behaviors: BTreeSet<String> = doc
        .tasks
        .values()
        .filter(|t| t.steel_thread)
        .flat_map(|t| t.behaviors.iter().cloned())
        .collect();
    let coverage = SpecCoverageInputs { all_behaviors, steel_thread_behaviors };

    gates::check_spec_coverage(
        &doc.tasks,
        &coverage.steel_thread_behaviors,
        &coverage.all_behaviors,
        &ctx.config.gate_config,
    )?;
    gates::check_phase_leakage(&doc.tasks, doc.phase.current, &ctx.config.gate_config)?;
    gates::check_acceptance_criterion_quality(&doc.tasks)?;
    println!("all planning gates pass");
    Ok(())
}

fn cmd_dag(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let graph = TaskGraph::build(&doc.tasks)?;
    for id in graph.topological_sort() {
        println!("{id}");
    }
    Ok(())
}
