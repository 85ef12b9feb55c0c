//! Pre-dispatch integrity verification (§4.5).

use super::checksum::checksum_file;
use super::model::Bundle;
use crate::errors::{BundleError, TaskerError};
use std::path::Path;

/// Verify a bundle's recorded checksums against the filesystem. Missing
/// or changed dependency files are fatal for this attempt; artifact
/// drift is reported separately so the caller can regenerate once.
pub enum IntegrityOutcome {
    Ok,
    ArtifactDrift(Vec<String>),
}

pub fn verify(bundle: &Bundle) -> Result<IntegrityOutcome, TaskerError> {
    for (path, expected) in &bundle.checksums.dependency_files {
        let path_ref = Path::new(path);
        if !path_ref.exists() {
            return Err(BundleError::DependencyMissing {
                task: bundle.task_id.clone(),
                path: path_ref.to_path_buf(),
            }
            .into());
        }
        let actual = checksum_file(path_ref).map_err(|e| {
            TaskerError::from(crate::errors::IoError::ReadFail {
                path: path_ref.to_path_buf(),
                source: e,
            })
        })?;
        if &actual != expected {
            return Err(BundleError::DependencyChanged {
                task: bundle.task_id.clone(),
                path: path_ref.to_path_buf(),
            }
            .into());
        }
    }

    // Artifact checksums are verified separately via `verify_artifacts`,
    // since their source paths (capability-map, physical-map,
    // constraints, task definition) live outside the bundle's own schema.
    Ok(IntegrityOutcome::Ok)
}

/// Compare the bundle's recorded artifact checksums against freshly
/// computed ones. Drift is non-fatal: the caller regenerates the bundle
/// and calls this once more before giving up.
pub fn verify_artifacts(
    bundle: &Bundle,
    current: &super::model::ArtifactChecksums,
) -> Result<IntegrityOutcome, TaskerError> {
    let Some(recorded) = &bundle.checksums.artifacts else {
        return Ok(IntegrityOutcome::Ok);
    };
    let mut drifted = Vec::new();
    if recorded.capability_map != current.capability_map {
        drifted.push("capability_map".to_string());
    }
    if recorded.physical_map != current.physical_map {
        drifted.push("physical_map".to_string());
    }
    if recorded.constraints != current.constraints {
        drifted.push("constraints".to_string());
    }
    if recorded.task_definition != current.task_definition {
        drifted.push("task_definition".to_string());
    }
    if drifted.is_empty() {
        Ok(IntegrityOutcome::Ok)
    } else {
        Ok(IntegrityOutcome::ArtifactDrift(drifted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::model::{BundleDependencies, Checksums};
    use chrono::Utc;

    fn bare_bundle() -> Bundle {
        Bundle {
            version: 1,
            bundle_created_at: Utc::now(),
            task_id: "T001".to_string(),
            name: "n".to_string(),
            phase: 1,
            target_dir: "/tmp".to_string(),
            context: None,
            behaviors: vec![],
            files: vec![],
            dependencies: BundleDependencies::default(),
            acceptance_criteria: vec![],
            constraints: None,
            state_machine: None,
            checksums: Checksums::default(),
        }
    }

    #[test]
    fn verify_fails_on_missing_dependency_file() {
        let mut bundle = bare_bundle();
        bundle
            .checksums
            .dependency_files
            .insert("/nonexistent/path.rs".to_string(), "deadbeefdeadbeef".to_string());
        let err = verify(&bundle).unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_MISSING");
    }

    #[test]
    fn verify_passes_with_no_dependencies() {
        let bundle = bare_bundle();
        assert!(matches!(verify(&bundle).unwrap(), IntegrityOutcome::Ok));
    }

    #[test]
    fn verify_artifacts_reports_drift_without_erroring() {
        let mut bundle = bare_bundle();
        bundle.checksums.artifacts = Some(super::super::model::ArtifactChecksums {
            capability_map: "aaaaaaaaaaaaaaaa".to_string(),
            physical_map: "bbbbbbbbbbbbbbbb".to_string(),
            constraints: "cccccccccccccccc".to_string(),
            task_definition: "dddddddddddddddd".to_string(),
        });
        let current = super::super::model::ArtifactChecksums {
            capability_map: "zzzzzzzzzzzzzzzz".to_string(),
            physical_map: "bbbbbbbbbbbbbbbb".to_string(),
            constraints: "cccccccccccccccc".to_string(),
            task_definition: "dddddddddddddddd".to_string(),
        };
        match verify_artifacts(&bundle, &current).unwrap() {
            IntegrityOutcome::ArtifactDrift(names) => assert_eq!(names, vec!["capability_map"]),
            IntegrityOutcome::Ok => panic!("expected drift"),
        }
    }
}
