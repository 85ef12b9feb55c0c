//! Pre-change file snapshot and rollback validation (§4.8).

use crate::bundle::checksum::checksum_file;
use crate::errors::TaskerError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub existed: bool,
    pub checksum: String,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: BTreeMap<PathBuf, SnapshotEntry>,
}

/// Record existence + checksum for each path a worker is about to
/// modify. Snapshotting a directory is an error.
pub fn snapshot(paths: &[PathBuf]) -> Result<Snapshot, TaskerError> {
    let mut entries = BTreeMap::new();
    for path in paths {
        if path.is_dir() {
            return Err(TaskerError::Other(anyhow::anyhow!(
                "cannot snapshot a directory: {}",
                path.display()
            )));
        }
        let entry = if path.exists() {
            SnapshotEntry {
                existed: true,
                checksum: checksum_file(path).map_err(|e| {
                    TaskerError::from(crate::errors::IoError::ReadFail {
                        path: path.clone(),
                        source: e,
                    })
                })?,
            }
        } else {
            SnapshotEntry {
                existed: false,
                checksum: String::new(),
            }
        };
        entries.insert(path.clone(), entry);
    }
    Ok(Snapshot { entries })
}

/// Validate that a rollback restored the snapshot correctly, given the
/// claimed created/modified paths. Returns the list of violations; an
/// empty list means validation passed.
pub fn validate(snapshot: &Snapshot, created: &[String], modified: &[String]) -> Vec<String> {
    let mut violations = Vec::new();

    for path in created {
        if Path::new(path).exists() {
            violations.push(format!("claimed-created path still exists: {path}"));
        }
    }

    for path in modified {
        let Some(entry) = snapshot.entries.get(Path::new(path)) else {
            continue;
        };
        let p = Path::new(path);
        if entry.existed {
            if !p.exists() {
                violations.push(format!("claimed-modified path missing: {path}"));
                continue;
            }
            match checksum_file(p) {
                Ok(actual) if actual == entry.checksum => {}
                Ok(_) => violations.push(format!(
                    "claimed-modified path does not match its original checksum: {path}"
                )),
                Err(e) => violations.push(format!("failed to checksum {path}: {e}")),
            }
        } else if p.exists() {
            violations.push(format!(
                "claimed-modified path did not exist pre-change but now exists: {path}"
            ));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn snapshot_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = snapshot(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn snapshot_records_nonexistent_paths_with_empty_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.rs");
        let snap = snapshot(&[path.clone()]).unwrap();
        let entry = &snap.entries[&path];
        assert!(!entry.existed);
        assert_eq!(entry.checksum, "");
    }

    #[test]
    fn validate_passes_when_claims_match_reality() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.rs");
        std::fs::File::create(&existing).unwrap().write_all(b"orig").unwrap();
        let new_file = dir.path().join("b.rs");

        let snap = snapshot(&[existing.clone(), new_file.clone()]).unwrap();

        std::fs::write(&new_file, b"new").unwrap();

        let violations = validate(
            &snap,
            &[new_file.to_string_lossy().to_string()],
            &[existing.to_string_lossy().to_string()],
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn validate_flags_claimed_modified_path_not_restored_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.rs");
        std::fs::File::create(&existing).unwrap().write_all(b"orig").unwrap();
        let snap = snapshot(&[existing.clone()]).unwrap();

        std::fs::write(&existing, b"left mutated, rollback failed").unwrap();

        let violations = validate(&snap, &[], &[existing.to_string_lossy().to_string()]);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn validate_flags_claimed_created_path_that_still_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftover.rs");
        let snap = snapshot(&[path.clone()]).unwrap();
        std::fs::write(&path, b"oops").unwrap();

        let violations = validate(&snap, &[path.to_string_lossy().to_string()], &[]);
        assert_eq!(violations.len(), 1);
    }
}
