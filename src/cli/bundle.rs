//! `bundle generate|validate|integrity|list|clean` (§6, §4.5).

use super::Context;
use crate::bundle::{self, BundleInputs};
use crate::errors::TaskerError;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum BundleCommand {
    /// Assemble a task's execution bundle and write it to `bundles/`.
    Generate { id: String },
    /// Schema-validate a generated bundle file.
    Validate { id: String },
    /// Check a generated bundle's recorded checksums against disk.
    Integrity { id: String },
    /// List bundle/result files present in `bundles/`.
    List,
    /// Remove bundle/result files for tasks in a terminal state.
    Clean,
}

pub fn dispatch(ctx: &Context, cmd: BundleCommand) -> Result<(), TaskerError> {
    match cmd {
        BundleCommand::Generate { id } => cmd_generate(ctx, &id),
        BundleCommand::Validate { id } => cmd_validate(ctx, &id),
        BundleCommand::Integrity { id } => cmd_integrity(ctx, &id),
        BundleCommand::List => cmd_list(ctx),
        BundleCommand::Clean => cmd_clean(ctx),
    }
}

fn cmd_generate(ctx: &Context, id: &str) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let task = doc
        .tasks
        .get(id)
        .ok_or_else(|| crate::errors::TaskError::UnknownId(id.to_string()))?;
    let artifacts = crate::supervisor::load_artifacts(&ctx.config.working_dir)?;
    let task_definition_raw = std::fs::read(&task.file).unwrap_or_default();
    let target_dir = doc.target_dir.to_string_lossy().to_string();

    let built = bundle::build(BundleInputs {
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
    })?;

    let bundles_dir = ctx.bundles_dir();
    std::fs::create_dir_all(&bundles_dir).map_err(|e| crate::errors::IoError::WriteFail {
        path: bundles_dir.clone(),
        source: e,
    })?;
    let path = bundle::bundle_path(&bundles_dir, id);
    let raw = serde_json::to_string_pretty(&built).map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
    std::fs::write(&path, raw).map_err(|e| crate::errors::IoError::WriteFail { path: path.clone(), source: e })?;
    println!("wrote {}", path.display());
    Ok(())
}

fn load_bundle(ctx: &Context, id: &str) -> Result<bundle::Bundle, TaskerError> {
    let path = bundle::bundle_path(&ctx.bundles_dir(), id);
    let raw = std::fs::read_to_string(&path).map_err(|e| crate::errors::IoError::ReadFail {
        path: path.clone(),
        source: e,
    })?;
    serde_json::from_str(&raw).map_err(|e| TaskerError::Other(anyhow::anyhow!("{}: {e}", path.display())))
}

fn cmd_validate(ctx: &Context, id: &str) -> Result<(), TaskerError> {
    let path = bundle::bundle_path(&ctx.bundles_dir(), id);
    let raw = std::fs::read_to_string(&path).map_err(|e| crate::errors::IoError::ReadFail {
        path: path.clone(),
        source: e,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| TaskerError::Other(anyhow::anyhow!("{}: {e}", path.display())))?;
    crate::schema::default_registry().validate("bundle", &value)?;
    println!("{id} bundle is schema-valid");
    Ok(())
}

fn cmd_integrity(ctx: &Context, id: &str) -> Result<(), TaskerError> {
    let built = load_bundle(ctx, id)?;
    match bundle::verify(&built)? {
        bundle::IntegrityOutcome::Ok => println!("{id} integrity ok"),
        bundle::IntegrityOutcome::ArtifactDrift(names) => {
            println!("{id} artifact drift: {}", names.join(", "));
        }
    }
    Ok(())
}

fn cmd_list(ctx: &Context) -> Result<(), TaskerError> {
    let dir = ctx.bundles_dir();
    if !dir.exists() {
        return Ok(());
    }
    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .map_err(|e| crate::errors::IoError::ReadFail { path: dir.clone(), source: e })?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn cmd_clean(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let terminal_ids: Vec<&String> = doc
        .tasks
        .iter()
        .filter(|(_, t)| t.status.is_terminal())
        .map(|(id, _)| id)
        .collect();
    let bundles_dir = ctx.bundles_dir();
    let mut removed = 0;
    for id in terminal_ids {
        for path in [bundle::bundle_path(&bundles_dir, id), bundle::result_path(&bundles_dir, id)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| crate::errors::IoError::WriteFail {
                    path: path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }
    }
    println!("removed {removed} file(s)");
    Ok(())
}
