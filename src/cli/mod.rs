//! Command-line surface (§6): one subcommand group per component,
//! mirroring the teacher's `cmd/` layout — a `cmd_*`-prefixed handler
//! per subcommand, `println!` for human output, errors bubbled up as
//! `TaskerError` and formatted once at the top by [`format_error`].

mod bundle;
mod checkpoint;
mod misc;
mod task;
mod validate;

use crate::config::Config;
use crate::errors::TaskerError;
use crate::storage::Store;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tasker")]
#[command(version, about = "Spec-driven task-decomposition and execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a fresh working directory and state document.
    Init {
        /// Directory the generated code will land in. Defaults to the
        /// parent of the working directory.
        #[arg(long)]
        target_dir: Option<PathBuf>,
    },
    /// Print the current phase, task counts, and halt status.
    Status,
    /// Attempt to advance to the next phase, running its gates.
    Advance {
        #[arg(long, value_enum)]
        spec_review: Option<SpecReviewArg>,
    },
    #[command(subcommand)]
    Task(task::TaskCommand),
    #[command(subcommand)]
    Bundle(bundle::BundleCommand),
    #[command(subcommand)]
    Validate(validate::ValidateCommand),
    #[command(subcommand)]
    Checkpoint(checkpoint::CheckpointCommand),
    /// Request a cooperative halt before the next batch dispatch.
    Halt {
        #[arg(long)]
        reason: Option<String>,
    },
    /// Clear a previously requested halt.
    Resume,
    /// Exit 5 if halted (state flag or STOP sentinel), else 0.
    CheckHalt,
    /// Record a calibration-ledger entry for a verified task.
    RecordVerification {
        task_id: String,
        #[arg(long, value_enum)]
        actual_outcome: ActualOutcomeArg,
    },
    /// Print the derived success/quality/calibration metrics.
    Metrics,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SpecReviewArg {
    Ready,
    ReadyWithNotes,
    NotReady,
}

impl From<SpecReviewArg> for crate::phase_machine::SpecReviewVerdict {
    fn from(v: SpecReviewArg) -> Self {
        match v {
            SpecReviewArg::Ready => Self::Ready,
            SpecReviewArg::ReadyWithNotes => Self::ReadyWithNotes,
            SpecReviewArg::NotReady => Self::NotReady,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ActualOutcomeArg {
    Correct,
    FalsePositive,
    FalseNegative,
}

impl From<ActualOutcomeArg> for crate::verification::ActualOutcome {
    fn from(v: ActualOutcomeArg) -> Self {
        match v {
            ActualOutcomeArg::Correct => Self::Correct,
            ActualOutcomeArg::FalsePositive => Self::FalsePositive,
            ActualOutcomeArg::FalseNegative => Self::FalseNegative,
        }
    }
}

/// Shared handle every subcommand handler receives: the lock-protected
/// store plus the resolved config it was built from.
pub struct Context {
    pub store: Store,
    pub config: Config,
}

impl Context {
    pub fn load() -> Result<Self, TaskerError> {
        let config = Config::load().map_err(TaskerError::Other)?;
        let store = Store::new(&config.working_dir)
            .with_lock_timeout(std::time::Duration::from_secs(config.lock_timeout_secs));
        Ok(Self { store, config })
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.config.working_dir.join("bundles")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.config.working_dir.join("tasks")
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.config.working_dir.join("calibration.json")
    }
}

pub fn run(cli: Cli) -> Result<(), TaskerError> {
    let name = command_name(&cli.command);
    tracing::info!(command = name, "dispatching");

    let result = run_dispatch(cli);
    if let Err(err) = &result {
        tracing::error!(command = name, error = %err, "command failed");
    }
    result
}

fn command_name(cmd: &Commands) -> &'static str {
    match cmd {
        Commands::Init { .. } => "init",
        Commands::Status => "status",
        Commands::Advance { .. } => "advance",
        Commands::Task(_) => "task",
        Commands::Bundle(_) => "bundle",
        Commands::Validate(_) => "validate",
        Commands::Checkpoint(_) => "checkpoint",
        Commands::Halt { .. } => "halt",
        Commands::Resume => "resume",
        Commands::CheckHalt => "check-halt",
        Commands::RecordVerification { .. } => "record-verification",
        Commands::Metrics => "metrics",
    }
}

fn run_dispatch(cli: Cli) -> Result<(), TaskerError> {
    if let Commands::Init { target_dir } = cli.command {
        return misc::cmd_init(target_dir);
    }

    let ctx = Context::load()?;
    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Status => misc::cmd_status(&ctx),
        Commands::Advance { spec_review } => misc::cmd_advance(&ctx, spec_review.map(Into::into)),
        Commands::Task(cmd) => task::dispatch(&ctx, cmd),
        Commands::Bundle(cmd) => bundle::dispatch(&ctx, cmd),
        Commands::Validate(cmd) => validate::dispatch(&ctx, cmd),
        Commands::Checkpoint(cmd) => checkpoint::dispatch(&ctx, cmd),
        Commands::Halt { reason } => misc::cmd_halt(&ctx, reason),
        Commands::Resume => misc::cmd_resume(&ctx),
        Commands::CheckHalt => misc::cmd_check_halt(&ctx),
        Commands::RecordVerification { task_id, actual_outcome } => {
            misc::cmd_record_verification(&ctx, task_id, actual_outcome.into())
        }
        Commands::Metrics => misc::cmd_metrics(&ctx),
    }
}

/// `ERROR [category:code]` plus an indented key=value context block
/// (spec.md §6/§7). The only context key every error carries is its
/// display message; richer structured context lives on the variant
/// itself and would be threaded through here if callers need it.
pub fn format_error(err: &TaskerError) -> String {
    format!("ERROR [{}:{}]\n  message={}", err.category(), err.code(), err)
}
