//! `checkpoint create|recover|status|resolve|complete|clear` (§6, §4.8).

use super::Context;
use crate::errors::{StateError, TaskerError};
use crate::graph::TaskGraph;
use crate::rollback::{self, OrphanDisposition};
use crate::state::CheckpointEntryStatus;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// Reserve a batch (the ready set, up to `max_parallel`) as a
    /// checkpoint, outside the supervisor's own batch cycle.
    Create,
    /// Reconcile a crash-recovered checkpoint against `bundles/`,
    /// applying any result files found and orphaning the rest.
    Recover,
    /// Print the active checkpoint, if any.
    Status,
    /// Apply an operator's disposition to an orphaned checkpoint entry
    /// left behind by `recover`, clearing the checkpoint once every
    /// entry has reached a terminal status.
    Resolve {
        id: String,
        #[arg(long, value_enum)]
        disposition: DispositionArg,
    },
    /// Report whether every entry in the active checkpoint has
    /// resolved to a terminal status.
    Complete,
    /// Clear a fully-resolved checkpoint.
    Clear,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum DispositionArg {
    Retry,
    Skip,
}

impl From<DispositionArg> for OrphanDisposition {
    fn from(v: DispositionArg) -> Self {
        match v {
            DispositionArg::Retry => Self::Retry,
            DispositionArg::Skip => Self::Skip,
        }
    }
}

pub fn dispatch(ctx: &Context, cmd: CheckpointCommand) -> Result<(), TaskerError> {
    match cmd {
        CheckpointCommand::Create => cmd_create(ctx),
        CheckpointCommand::Recover => cmd_recover(ctx),
        CheckpointCommand::Status => cmd_status(ctx),
        CheckpointCommand::Resolve { id, disposition } => cmd_resolve(ctx, &id, disposition.into()),
        CheckpointCommand::Complete => cmd_complete(ctx),
        CheckpointCommand::Clear => cmd_clear(ctx),
    }
}

fn cmd_create(ctx: &Context) -> Result<(), TaskerError> {
    let mut batch = Vec::new();
    ctx.store.with_lock(|doc| {
        let graph = TaskGraph::build(&doc.tasks)?;
        let ready = graph.ready_set(&doc.tasks, doc.checkpoint.as_ref());
        batch = ready.into_iter().take(ctx.config.max_parallel).collect::<Vec<_>>();
        doc.create_checkpoint(batch.clone())
    })?;
    println!("checkpoint created over: {}", batch.join(", "));
    Ok(())
}

fn cmd_recover(ctx: &Context) -> Result<(), TaskerError> {
    let mut orphaned = Vec::new();
    ctx.store.with_lock(|doc| {
        orphaned = crate::rollback::reconcile_checkpoint(doc, &ctx.bundles_dir())?;
        Ok(())
    })?;
    if orphaned.is_empty() {
        println!("checkpoint fully reconciled, no orphans");
    } else {
        println!("orphaned: {}", orphaned.join(", "));
    }
    Ok(())
}

fn cmd_resolve(ctx: &Context, id: &str, disposition: OrphanDisposition) -> Result<(), TaskerError> {
    let mut cleared = false;
    ctx.store.with_lock(|doc| {
        let entry_status = doc
            .checkpoint
            .as_ref()
            .and_then(|cp| cp.per_task_result.get(id))
            .copied();
        if entry_status != Some(CheckpointEntryStatus::Orphaned) {
            return Err(StateError::Invariant {
                name: "I-5",
                detail: format!("{id} is not an orphaned checkpoint entry"),
            }
            .into());
        }

        rollback::resolve_orphan(doc, id, disposition)?;

        if doc.checkpoint.as_ref().is_some_and(|cp| cp.all_terminal()) {
            doc.clear_checkpoint()?;
            cleared = true;
        }
        Ok(())
    })?;
    println!("{id} resolved ({disposition:?})");
    if cleared {
        println!("checkpoint cleared");
    }
    Ok(())
}

fn cmd_status(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    match &doc.checkpoint {
        Some(cp) => {
            let json = serde_json::to_string_pretty(cp).map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
            println!("{json}");
        }
        None => println!("no active checkpoint"),
    }
    Ok(())
}

fn cmd_complete(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    match &doc.checkpoint {
        Some(cp) if cp.all_terminal() => println!("checkpoint fully resolved"),
        Some(_) => println!("checkpoint has unresolved entries"),
        None => println!("no active checkpoint"),
    }
    Ok(())
}

fn cmd_clear(ctx: &Context) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| doc.clear_checkpoint())?;
    println!("checkpoint cleared");
    Ok(())
}
