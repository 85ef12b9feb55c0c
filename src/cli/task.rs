//! `task list|ready|get|start|complete|fail|skip|retry|load` (§6).

use super::Context;
use crate::errors::TaskerError;
use crate::graph::TaskGraph;
use crate::state::Task;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum TaskCommand {
    /// List every loaded task with its status and attempt count.
    List,
    /// List the ids currently eligible for dispatch.
    Ready,
    /// Print one task's full record as JSON.
    Get { id: String },
    /// Transition a task `ready|pending -> running`.
    Start { id: String },
    /// Transition a task `running -> complete`.
    Complete {
        id: String,
        #[arg(long = "created", value_delimiter = ',')]
        files_created: Vec<String>,
        #[arg(long = "modified", value_delimiter = ',')]
        files_modified: Vec<String>,
    },
    /// Transition a task `running -> failed`.
    Fail {
        id: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        retryable: Option<bool>,
    },
    /// Transition a task `failed -> pending` via `skipped`.
    Skip {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Transition a task `failed -> pending`, incrementing `attempts`
    /// the next time it is started.
    Retry { id: String },
    /// Load a task definition file into the state document.
    Load { path: std::path::PathBuf },
}

pub fn dispatch(ctx: &Context, cmd: TaskCommand) -> Result<(), TaskerError> {
    match cmd {
        TaskCommand::List => cmd_list(ctx),
        TaskCommand::Ready => cmd_ready(ctx),
        TaskCommand::Get { id } => cmd_get(ctx, &id),
        TaskCommand::Start { id } => cmd_start(ctx, &id),
        TaskCommand::Complete { id, files_created, files_modified } => {
            cmd_complete(ctx, &id, files_created, files_modified)
        }
        TaskCommand::Fail { id, message, category, retryable } => {
            cmd_fail(ctx, &id, message, category, retryable)
        }
        TaskCommand::Skip { id, reason } => cmd_skip(ctx, &id, reason),
        TaskCommand::Retry { id } => cmd_retry(ctx, &id),
        TaskCommand::Load { path } => cmd_load(ctx, &path),
    }
}

fn cmd_list(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    for task in doc.tasks.values() {
        println!("{}\t{}\t{}\tattempts={}", task.id, task.status, task.name, task.attempts);
    }
    Ok(())
}

fn cmd_ready(ctx: &Context) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let graph = TaskGraph::build(&doc.tasks)?;
    for id in graph.ready_set(&doc.tasks, doc.checkpoint.as_ref()) {
        println!("{id}");
    }
    Ok(())
}

fn cmd_get(ctx: &Context, id: &str) -> Result<(), TaskerError> {
    let doc = ctx.store.load()?;
    let task = doc
        .tasks
        .get(id)
        .ok_or_else(|| crate::errors::TaskError::UnknownId(id.to_string()))?;
    let json = serde_json::to_string_pretty(task).map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
    println!("{json}");
    Ok(())
}

fn cmd_start(ctx: &Context, id: &str) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| doc.start_task(id))?;
    println!("{id} started");
    Ok(())
}

fn cmd_complete(
    ctx: &Context,
    id: &str,
    files_created: Vec<String>,
    files_modified: Vec<String>,
) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| doc.complete_task(id, files_created.clone(), files_modified.clone()))?;
    println!("{id} complete");
    Ok(())
}

fn cmd_fail(
    ctx: &Context,
    id: &str,
    message: String,
    category: Option<String>,
    retryable: Option<bool>,
) -> Result<(), TaskerError> {
    ctx.store
        .with_lock(|doc| doc.fail_task(id, message.clone(), category.clone(), retryable))?;
    println!("{id} failed");
    Ok(())
}

fn cmd_skip(ctx: &Context, id: &str, reason: Option<String>) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| doc.skip_task(id, reason.clone()))?;
    println!("{id} skipped");
    Ok(())
}

fn cmd_retry(ctx: &Context, id: &str) -> Result<(), TaskerError> {
    ctx.store.with_lock(|doc| doc.retry_task(id))?;
    println!("{id} returned to pending");
    Ok(())
}

fn cmd_load(ctx: &Context, path: &std::path::Path) -> Result<(), TaskerError> {
    let raw = std::fs::read_to_string(path).map_err(|e| crate::errors::IoError::ReadFail {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| TaskerError::Other(anyhow::anyhow!("{}: {e}", path.display())))?;
    crate::schema::default_registry().validate("task", &value)?;
    let task: Task =
        serde_json::from_value(value).map_err(|e| TaskerError::Other(anyhow::anyhow!("{}: {e}", path.display())))?;
    let id = task.id.clone();
    ctx.store.with_lock(|doc| {
        doc.load_task(task.clone())?;
        doc.refresh_ready_statuses();
        Ok(())
    })?;
    println!("{id} loaded");
    Ok(())
}
