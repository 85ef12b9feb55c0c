//! Runtime configuration (§6.2): working-directory resolution plus the
//! optional `tasker.toml` for scheduler/gate tuning. Every field has a
//! built-in default, so the file itself is entirely optional, matching
//! the teacher's layered config-with-fallback pattern.

use crate::phase_machine::gates::GateConfig;
use crate::state::PhaseTag;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_MAX_PARALLEL: usize = 3;
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HASH_PREFIX_LEN: usize = 16;

/// On-disk shape of `tasker.toml`. Every table and field is optional;
/// absence falls back to the corresponding default.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    supervisor: SupervisorTable,
    #[serde(default)]
    storage: StorageTable,
    #[serde(default)]
    gates: GatesTable,
    #[serde(default)]
    bundle: BundleTable,
}

#[derive(Debug, Default, Deserialize)]
struct SupervisorTable {
    max_parallel: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageTable {
    lock_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatesTable {
    spec_coverage_threshold: Option<f64>,
    spec_coverage_threshold_steel_thread: Option<f64>,
    phase_leakage_keywords: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct BundleTable {
    hash_prefix_len: Option<usize>,
}

/// Fully-resolved configuration, defaults applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub working_dir: PathBuf,
    pub max_parallel: usize,
    pub lock_timeout_secs: u64,
    pub hash_prefix_len: usize,
    pub gate_config: GateConfig,
}

impl Config {
    /// Resolve the working directory (`TASKER_DIR` env var, default
    /// `.tasker` under the current directory) and load `tasker.toml`
    /// from its parent if present.
    pub fn load() -> Result<Self> {
        let working_dir = working_dir()?;
        let toml_path = working_dir
            .parent()
            .map(|p| p.join("tasker.toml"))
            .unwrap_or_else(|| PathBuf::from("tasker.toml"));
        Self::load_from(working_dir, &toml_path)
    }

    fn load_from(working_dir: PathBuf, toml_path: &Path) -> Result<Self> {
        let parsed: TomlConfig = if toml_path.exists() {
            let raw = std::fs::read_to_string(toml_path)
                .with_context(|| format!("failed to read {}", toml_path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse {}", toml_path.display()))?
        } else {
            TomlConfig::default()
        };

        let mut gate_config = GateConfig::default();
        if let Some(t) = parsed.gates.spec_coverage_threshold {
            gate_config.spec_coverage_threshold = t;
        }
        if let Some(t) = parsed.gates.spec_coverage_threshold_steel_thread {
            gate_config.spec_coverage_threshold_steel_thread = t;
        }
        if let Some(map) = parsed.gates.phase_leakage_keywords {
            gate_config.phase_leakage_keywords = map
                .into_iter()
                .filter_map(|(k, v)| parse_phase_tag(&k).map(|tag| (tag, v)))
                .collect();
        }

        Ok(Self {
            working_dir,
            max_parallel: parsed.supervisor.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL),
            lock_timeout_secs: parsed.storage.lock_timeout_secs.unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS),
            hash_prefix_len: parsed.bundle.hash_prefix_len.unwrap_or(DEFAULT_HASH_PREFIX_LEN),
            gate_config,
        })
    }
}

fn parse_phase_tag(s: &str) -> Option<PhaseTag> {
    crate::state::PHASE_ORDER
        .iter()
        .copied()
        .find(|tag| tag.as_str() == s)
}

fn working_dir() -> Result<PathBuf> {
    match std::env::var("TASKER_DIR") {
        Ok(dir) => Ok(PathBuf::from(dir)),
        Err(_) => Ok(std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(".tasker")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_missing_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(dir.path().join(".tasker"), &dir.path().join("tasker.toml")).unwrap();
        assert_eq!(cfg.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(cfg.lock_timeout_secs, DEFAULT_LOCK_TIMEOUT_SECS);
        assert_eq!(cfg.hash_prefix_len, DEFAULT_HASH_PREFIX_LEN);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("tasker.toml");
        std::fs::write(
            &toml_path,
            r#"
            [supervisor]
            max_parallel = 5

            [storage]
            lock_timeout_secs = 60

            [gates]
            spec_coverage_threshold = 0.75
            "#,
        )
        .unwrap();

        let cfg = Config::load_from(dir.path().join(".tasker"), &toml_path).unwrap();
        assert_eq!(cfg.max_parallel, 5);
        assert_eq!(cfg.lock_timeout_secs, 60);
        assert_eq!(cfg.gate_config.spec_coverage_threshold, 0.75);
    }

    #[test]
    fn phase_leakage_keywords_parse_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("tasker.toml");
        std::fs::write(
            &toml_path,
            r#"
            [gates]
            phase_leakage_keywords = { validation = ["smoke test"] }
            "#,
        )
        .unwrap();

        let cfg = Config::load_from(dir.path().join(".tasker"), &toml_path).unwrap();
        assert_eq!(
            cfg.gate_config.phase_leakage_keywords.get(&PhaseTag::Validation),
            Some(&vec!["smoke test".to_string()])
        );
    }
}
