//! Task definitions and lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a task (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Complete,
    Failed,
    Blocked,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }

    /// Whether this status counts as "done" for dependency satisfaction:
    /// both `complete` and `skipped` satisfy a dependent's `depends_on`.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single task in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub phase: u32,
    pub status: TaskStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub steel_thread: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    pub file: PathBuf,
    /// Behaviors (capability-map ids) this task implements; used by the
    /// bundle builder (C5) and the spec-coverage planning gate (C4).
    #[serde(default)]
    pub behaviors: Vec<String>,
    /// Task-declared files, schema-validated at load time (spec.md §6).
    #[serde(default)]
    pub files: Vec<TaskFileDecl>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub context: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, phase: u32, file: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phase,
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            blocks: Vec::new(),
            steel_thread: false,
            attempts: 0,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            error: None,
            error_category: None,
            retryable: None,
            verification: None,
            file,
            behaviors: Vec::new(),
            files: Vec::new(),
            acceptance_criteria: Vec::new(),
            context: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFileDecl {
    pub path: String,
    pub action: FileAction,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub criterion: String,
    pub verification: String,
}

/// Recognized executable prefixes for acceptance-criterion verification
/// commands (spec.md §4.4's acceptance-criterion quality gate).
pub const RECOGNIZED_VERIFICATION_PREFIXES: &[&str] = &[
    "go test", "pytest", "npm test", "make test", "cargo test", "bash", "sh", "./",
];

/// Verdict for a verification-ledger entry (C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Proceed,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Score {
    Pass,
    Partial,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub score: Score,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    pub types: Score,
    pub docs: Score,
    pub patterns: Score,
    pub errors: Score,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsInfo {
    pub coverage: f64,
    pub assertions: u32,
    pub edge_cases: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub verdict: Verdict,
    pub recommendation: Recommendation,
    pub criteria: Vec<Criterion>,
    pub quality: Quality,
    pub tests: TestsInfo,
    pub verified_at: DateTime<Utc>,
}
