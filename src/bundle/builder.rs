//! Bundle generation (§4.5 steps 1-6).

use super::checksum::checksum_bytes;
use super::model::{
    ArtifactChecksums, Bundle, BundleDependencies, CapabilityMap, Checksums, PhysicalMap,
};
use crate::errors::TaskerError;
use crate::state::{Task, TaskStatus};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub struct BundleInputs<'a> {
    pub task: &'a Task,
    pub tasks: &'a BTreeMap<String, Task>,
    pub capability_map: &'a CapabilityMap,
    pub capability_map_raw: &'a [u8],
    pub physical_map: &'a PhysicalMap,
    pub physical_map_raw: &'a [u8],
    pub constraints: Option<&'a Value>,
    pub constraints_raw: &'a [u8],
    pub task_definition_raw: &'a [u8],
    pub target_dir: &'a str,
}

/// Build an execution bundle for a task in a non-terminal state.
pub fn build(inputs: BundleInputs) -> Result<Bundle, TaskerError> {
    let BundleInputs {
        task,
        tasks,
        capability_map,
        capability_map_raw,
        physical_map,
        physical_map_raw,
        constraints,
        constraints_raw,
        task_definition_raw,
        target_dir,
    } = inputs;

    let behaviors: Vec<_> = task
        .behaviors
        .iter()
        .filter_map(|id| capability_map.get(id).cloned())
        .collect();

    let mut files: Vec<_> = task.files.clone();
    let mut seen: std::collections::BTreeSet<String> =
        files.iter().map(|f| f.path.clone()).collect();
    for behavior_id in &task.behaviors {
        for entry in physical_map.for_behavior(behavior_id) {
            for path in entry.files.iter().chain(entry.tests.iter()) {
                if seen.insert(path.clone()) {
                    files.push(crate::state::TaskFileDecl {
                        path: path.clone(),
                        action: crate::state::FileAction::Modify,
                        layer: None,
                        purpose: None,
                    });
                }
            }
        }
    }

    let mut dependency_files: BTreeMap<String, String> = BTreeMap::new();
    for dep_id in &task.depends_on {
        if let Some(dep) = tasks.get(dep_id) {
            if dep.status == TaskStatus::Complete {
                for path in dep.files_created.iter() {
                    let checksum = std::fs::read(path)
                        .map(|bytes| checksum_bytes(&bytes))
                        .unwrap_or_default();
                    dependency_files.insert(path.clone(), checksum);
                }
            }
        }
    }

    let checksums = Checksums {
        artifacts: Some(ArtifactChecksums {
            capability_map: checksum_bytes(capability_map_raw),
            physical_map: checksum_bytes(physical_map_raw),
            constraints: checksum_bytes(constraints_raw),
            task_definition: checksum_bytes(task_definition_raw),
        }),
        dependency_files,
    };

    Ok(Bundle {
        version: super::model::BUNDLE_VERSION,
        bundle_created_at: Utc::now(),
        task_id: task.id.clone(),
        name: task.name.clone(),
        phase: task.phase,
        target_dir: target_dir.to_string(),
        context: task.context.clone(),
        behaviors,
        files,
        dependencies: BundleDependencies {
            tasks: task.depends_on.clone(),
            files: Vec::new(),
            external: Vec::new(),
        },
        acceptance_criteria: task.acceptance_criteria.clone(),
        constraints: constraints.cloned(),
        state_machine: None,
        checksums,
    })
}

pub fn bundle_path(bundles_dir: &Path, task_id: &str) -> std::path::PathBuf {
    bundles_dir.join(format!("{task_id}-bundle.json"))
}

pub fn result_path(bundles_dir: &Path, task_id: &str) -> std::path::PathBuf {
    bundles_dir.join(format!("{task_id}-result.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn build_deduplicates_files_by_path() {
        let mut task = Task::new("T001", "n", 1, PathBuf::from("tasks/T001.json"));
        task.behaviors.push("auth.login".to_string());
        task.files.push(crate::state::TaskFileDecl {
            path: "src/auth.rs".to_string(),
            action: crate::state::FileAction::Create,
            layer: None,
            purpose: None,
        });

        let capability_map = CapabilityMap {
            behaviors: vec![super::super::model::Behavior {
                id: "auth.login".to_string(),
                description: String::new(),
                capability: None,
            }],
        };
        let physical_map = PhysicalMap {
            entries: vec![super::super::model::PhysicalMapEntry {
                behavior_id: "auth.login".to_string(),
                files: vec!["src/auth.rs".to_string(), "src/session.rs".to_string()],
                tests: vec![],
            }],
        };
        let tasks = BTreeMap::new();

        let bundle = build(BundleInputs {
            task: &task,
            tasks: &tasks,
            capability_map: &capability_map,
            capability_map_raw: b"{}",
            physical_map: &physical_map,
            physical_map_raw: b"{}",
            constraints: None,
            constraints_raw: b"",
            task_definition_raw: b"{}",
            target_dir: "/tmp/target",
        })
        .unwrap();

        let paths: Vec<_> = bundle.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths.iter().filter(|p| **p == "src/auth.rs").count(), 1);
        assert!(paths.contains(&"src/session.rs"));
        assert_eq!(bundle.checksums.artifacts.unwrap().capability_map.len(), 16);
    }
}
