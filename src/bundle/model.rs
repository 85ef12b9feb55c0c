//! Bundle, capability-map, physical-map, and result-file types (spec.md §3, §4.5).

use crate::state::{AcceptanceCriterion, TaskFileDecl, Verification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Behavior {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capability: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityMap {
    pub behaviors: Vec<Behavior>,
}

impl CapabilityMap {
    pub fn get(&self, id: &str) -> Option<&Behavior> {
        self.behaviors.iter().find(|b| b.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalMapEntry {
    pub behavior_id: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalMap {
    pub entries: Vec<PhysicalMapEntry>,
}

impl PhysicalMap {
    pub fn for_behavior(&self, id: &str) -> impl Iterator<Item = &PhysicalMapEntry> {
        self.entries.iter().filter(move |e| e.behavior_id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactChecksums {
    pub capability_map: String,
    pub physical_map: String,
    pub constraints: String,
    pub task_definition: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checksums {
    pub artifacts: Option<ArtifactChecksums>,
    #[serde(default)]
    pub dependency_files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleDependencies {
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub external: Vec<String>,
}

/// Execution bundle: a self-contained description of one task attempt,
/// handed to a worker process as its sole argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub version: u32,
    pub bundle_created_at: DateTime<Utc>,
    pub task_id: String,
    pub name: String,
    pub phase: u32,
    pub target_dir: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub behaviors: Vec<Behavior>,
    #[serde(default)]
    pub files: Vec<TaskFileDecl>,
    pub dependencies: BundleDependencies,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub constraints: Option<Value>,
    #[serde(default)]
    pub state_machine: Option<Value>,
    pub checksums: Checksums,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultFiles {
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultError {
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub task_id: String,
    pub name: String,
    pub status: ResultStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub files: ResultFiles,
    #[serde(default)]
    pub verification: Option<Verification>,
    #[serde(default)]
    pub error: Option<ResultError>,
    #[serde(default)]
    pub notes: Option<String>,
}
