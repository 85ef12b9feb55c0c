//! Typed error hierarchy for the tasker engine.
//!
//! One enum per subsystem family from the error taxonomy (spec §7), plus
//! a top-level `TaskerError` that wraps them all. Every leaf error knows
//! its own `code()`, and `TaskerError` knows the enclosing `category()`,
//! so the CLI layer can format `ERROR [category:code]` without
//! re-deriving it from the variant.

use std::path::PathBuf;
use thiserror::Error;

/// Storage-layer failures (C1): atomic read/write, advisory locking.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read {path}: {source}")]
    ReadFail {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFail {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path does not exist: {0}")]
    NotExists(PathBuf),
}

impl IoError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadFail { .. } => "READ_FAIL",
            Self::WriteFail { .. } => "WRITE_FAIL",
            Self::NotExists(_) => "NOT_EXISTS",
        }
    }
}

/// State-model failures (C2): the document, its lock, its invariants.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state document not found at {0}")]
    NotFound(PathBuf),

    #[error("timed out acquiring lock on {path} after {timeout_secs}s")]
    LockTimeout { path: PathBuf, timeout_secs: u64 },

    #[error("state document at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("schema version mismatch: document has {found}, expected {expected}")]
    SchemaVersionMismatch { found: String, expected: String },

    #[error("invariant {name} violated: {detail}")]
    Invariant { name: &'static str, detail: String },
}

impl StateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Corrupt { .. } => "CORRUPT",
            Self::SchemaVersionMismatch { .. } => "SCHEMA_VERSION_MISMATCH",
            Self::Invariant { .. } => "INVARIANT",
        }
    }
}

/// JSON-Schema validation failures (artifacts, bundles, results).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{artifact} failed schema validation: {}", .errors.join("; "))]
    ValidationFailed {
        artifact: String,
        errors: Vec<String>,
    },

    #[error("no schema registered for artifact kind '{0}'")]
    UnknownSchema(String),
}

impl SchemaError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::UnknownSchema(_) => "UNKNOWN_SCHEMA",
        }
    }
}

/// Task-graph failures (C3): cycles, dangling references, steel threads.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cycle detected: {}", .members.join(" -> "))]
    CycleDetected { members: Vec<String> },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    MissingDependency { task: String, dependency: String },

    #[error("steel-thread subgraph broken: {detail}")]
    SteelThreadBroken { detail: String },
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::MissingDependency { .. } => "MISSING_DEPENDENCY",
            Self::SteelThreadBroken { .. } => "STEEL_THREAD_BROKEN",
        }
    }
}

/// Execution-bundle failures (C5): integrity verification before dispatch.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("dependency file missing for task {task}: {}", .path.display())]
    DependencyMissing { task: String, path: PathBuf },

    #[error("dependency file changed for task {task}: {}", .path.display())]
    DependencyChanged { task: String, path: PathBuf },

    #[error("artifact drift detected for task {task}: {artifact}")]
    ArtifactDrift { task: String, artifact: String },
}

impl BundleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DependencyMissing { .. } => "DEPENDENCY_MISSING",
            Self::DependencyChanged { .. } => "DEPENDENCY_CHANGED",
            Self::ArtifactDrift { .. } => "ARTIFACT_DRIFT",
        }
    }
}

/// Phase-machine failures (C4): gated advance.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("gate '{gate}' failed: {}", .offenders.join(", "))]
    GateFailed { gate: String, offenders: Vec<String> },

    #[error("not all tasks are in a terminal state")]
    NotAllComplete,
}

impl PhaseError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::GateFailed { .. } => "GATE_FAILED",
            Self::NotAllComplete => "NOT_ALL_COMPLETE",
        }
    }
}

/// Task-lifecycle failures (C2): invalid transitions and unknown ids.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{0}' is already running")]
    AlreadyRunning(String),

    #[error("invalid transition for task '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("unknown task id '{0}'")]
    UnknownId(String),
}

impl TaskError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::UnknownId(_) => "UNKNOWN_ID",
        }
    }
}

/// Supervisor/worker failures (C6).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("worker for task '{0}' produced no result file")]
    WorkerMissingResult(String),

    #[error("worker for task '{task}' failed: {message}")]
    WorkerFailed { task: String, message: String },
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkerMissingResult(_) => "WORKER_MISSING_RESULT",
            Self::WorkerFailed { .. } => "WORKER_FAILED",
        }
    }
}

/// The union of every subsystem error, tagged with its taxonomy category.
#[derive(Debug, Error)]
pub enum TaskerError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("halted")]
    Halted,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskerError {
    /// The taxonomy category this error belongs to (spec.md §7).
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::State(_) => "state",
            Self::Schema(_) => "schema",
            Self::Graph(_) => "graph",
            Self::Bundle(_) => "bundle",
            Self::Phase(_) => "phase",
            Self::Task(_) => "task",
            Self::Execution(_) => "execution",
            Self::Halted => "halt",
            Self::Other(_) => "io",
        }
    }

    /// The specific code within the category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Schema(e) => e.code(),
            Self::Graph(e) => e.code(),
            Self::Bundle(e) => e.code(),
            Self::Phase(e) => e.code(),
            Self::Task(e) => e.code(),
            Self::Execution(e) => e.code(),
            Self::Halted => "HALTED",
            Self::Other(_) => "UNKNOWN",
        }
    }

    /// Process exit code per spec.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Schema(_) | Self::Phase(_) | Self::Graph(_) => 2,
            Self::State(StateError::LockTimeout { .. }) => 3,
            Self::State(StateError::Corrupt { .. }) => 4,
            Self::Halted => 5,
            _ => 1,
        }
    }
}
