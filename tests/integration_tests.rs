//! Integration tests for the task engine CLI.
//!
//! These exercise the binary as a subprocess end to end, the way an
//! operator (or the supervisor loop itself) would drive it.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a tasker Command, with `TASKER_DIR` pointed at a
/// fresh `.tasker` under the given project root.
fn tasker(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tasker");
    cmd.current_dir(dir.path());
    cmd.env("TASKER_DIR", dir.path().join(".tasker"));
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn init_project(dir: &TempDir) {
    tasker(dir).arg("init").assert().success();
}

fn write_task(dir: &TempDir, id: &str, json: &str) {
    let tasks_dir = dir.path().join("tasks");
    fs::create_dir_all(&tasks_dir).unwrap();
    fs::write(tasks_dir.join(format!("{id}.json")), json).unwrap();
}

fn minimal_task_json(id: &str, depends_on: &[&str]) -> String {
    let deps = depends_on
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"{{
  "id": "{id}",
  "name": "do {id}",
  "phase": 1,
  "status": "pending",
  "depends_on": [{deps}],
  "blocks": [],
  "file": "tasks/{id}.json"
}}"#
    )
}

// =============================================================================
// Basic CLI
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn help_succeeds() {
        cargo_bin_cmd!("tasker").arg("--help").assert().success();
    }

    #[test]
    fn version_succeeds() {
        cargo_bin_cmd!("tasker").arg("--version").assert().success();
    }

    #[test]
    fn init_creates_state_document() {
        let dir = create_temp_project();
        init_project(&dir);
        assert!(dir.path().join(".tasker/state.json").exists());
    }

    #[test]
    fn init_twice_fails() {
        let dir = create_temp_project();
        init_project(&dir);
        tasker(&dir).arg("init").assert().failure();
    }

    #[test]
    fn status_on_fresh_project_reports_intake_phase() {
        let dir = create_temp_project();
        init_project(&dir);
        tasker(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("phase:"));
    }
}

// =============================================================================
// Task lifecycle (S1: linear graph to completion)
// =============================================================================

mod task_lifecycle {
    use super::*;

    #[test]
    fn load_list_and_ready_reflect_a_linear_chain() {
        let dir = create_temp_project();
        init_project(&dir);

        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        write_task(&dir, "T002", &minimal_task_json("T002", &["T001"]));

        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T002.json"))
            .assert()
            .success();

        tasker(&dir)
            .arg("task")
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("T001"))
            .stdout(predicate::str::contains("T002"));

        // T002 depends on T001, which hasn't completed yet.
        tasker(&dir)
            .arg("task")
            .arg("ready")
            .assert()
            .success()
            .stdout(predicate::str::contains("T001"))
            .stdout(predicate::str::contains("T002").not());
    }

    #[test]
    fn start_then_complete_moves_a_task_to_terminal_status() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();

        tasker(&dir).arg("task").arg("start").arg("T001").assert().success();
        tasker(&dir)
            .arg("task")
            .arg("complete")
            .arg("T001")
            .arg("--created")
            .arg("src/lib.rs")
            .assert()
            .success();

        tasker(&dir)
            .arg("task")
            .arg("get")
            .arg("T001")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"complete\""));
    }

    #[test]
    fn fail_then_retry_returns_a_task_to_pending() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();

        tasker(&dir).arg("task").arg("start").arg("T001").assert().success();
        tasker(&dir)
            .arg("task")
            .arg("fail")
            .arg("T001")
            .arg("--message")
            .arg("boom")
            .assert()
            .success();
        tasker(&dir).arg("task").arg("retry").arg("T001").assert().success();

        tasker(&dir)
            .arg("task")
            .arg("get")
            .arg("T001")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"pending\""));
    }

    #[test]
    fn get_unknown_task_fails_with_task_error() {
        let dir = create_temp_project();
        init_project(&dir);
        tasker(&dir)
            .arg("task")
            .arg("get")
            .arg("T999")
            .assert()
            .failure()
            .stderr(predicate::str::contains("ERROR [task:"));
    }
}

// =============================================================================
// Validation (S2: dependency on an unknown task is rejected up front)
// =============================================================================

mod validation {
    use super::*;

    #[test]
    fn loading_a_task_with_a_missing_required_field_is_rejected() {
        let dir = create_temp_project();
        init_project(&dir);
        let bad = r#"{ "id": "T001", "name": "broken" }"#;
        write_task(&dir, "T001", bad);

        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("ERROR [schema:"));
    }

    #[test]
    fn validate_tasks_passes_over_a_well_formed_directory() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));

        tasker(&dir)
            .arg("validate")
            .arg("tasks")
            .assert()
            .success()
            .stdout(predicate::str::contains("schema-valid"));
    }

    #[test]
    fn dag_prints_a_topological_order() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        write_task(&dir, "T002", &minimal_task_json("T002", &["T001"]));
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T002.json"))
            .assert()
            .success();

        let output = tasker(&dir).arg("validate").arg("dag").assert().success();
        let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
        let t1 = stdout.find("T001").unwrap();
        let t2 = stdout.find("T002").unwrap();
        assert!(t1 < t2, "T001 must precede T002 in topological order");
    }
}

// =============================================================================
// Cooperative halt (S5)
// =============================================================================

mod halt {
    use super::*;

    #[test]
    fn halt_then_check_halt_then_resume() {
        let dir = create_temp_project();
        init_project(&dir);

        tasker(&dir)
            .arg("halt")
            .arg("--reason")
            .arg("operator pause")
            .assert()
            .success();

        tasker(&dir)
            .arg("check-halt")
            .assert()
            .failure()
            .stderr(predicate::str::contains("ERROR [halt:HALTED]"));

        tasker(&dir).arg("resume").assert().success();
        tasker(&dir)
            .arg("check-halt")
            .assert()
            .success()
            .stdout(predicate::str::contains("not halted"));
    }

    #[test]
    fn stop_file_also_blocks_progress() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::write(dir.path().join(".tasker/STOP"), "").unwrap();

        tasker(&dir).arg("check-halt").assert().failure();
    }
}

// =============================================================================
// Checkpoints (S3: crash recovery)
// =============================================================================

mod checkpoints {
    use super::*;

    #[test]
    fn checkpoint_status_with_none_active() {
        let dir = create_temp_project();
        init_project(&dir);
        tasker(&dir)
            .arg("checkpoint")
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("no active checkpoint"));
    }

    #[test]
    fn checkpoint_create_reserves_the_ready_set() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();

        tasker(&dir)
            .arg("checkpoint")
            .arg("create")
            .assert()
            .success()
            .stdout(predicate::str::contains("T001"));

        tasker(&dir)
            .arg("checkpoint")
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"T001\""));
    }

    #[test]
    fn recover_with_no_result_files_orphans_the_checkpoint_batch() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();
        tasker(&dir).arg("checkpoint").arg("create").assert().success();
        tasker(&dir).arg("task").arg("start").arg("T001").assert().success();

        tasker(&dir)
            .arg("checkpoint")
            .arg("recover")
            .assert()
            .success()
            .stdout(predicate::str::contains("orphaned"));
    }
}

// =============================================================================
// Planning gates and phase advancement (S6)
// =============================================================================

mod planning_gates {
    use super::*;

    #[test]
    fn planning_gates_fail_when_no_tasks_cover_any_behavior() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::create_dir_all(dir.path().join(".tasker/artifacts")).unwrap();
        fs::write(
            dir.path().join(".tasker/artifacts/capability-map.json"),
            r#"{"behaviors":[{"id":"auth.login"}]}"#,
        )
        .unwrap();

        tasker(&dir)
            .arg("validate")
            .arg("planning-gates")
            .assert()
            .failure()
            .stderr(predicate::str::contains("ERROR [phase:"));
    }
}

// =============================================================================
// Metrics and calibration
// =============================================================================

mod verification {
    use super::*;

    #[test]
    fn metrics_on_a_fresh_project_reports_zeros() {
        let dir = create_temp_project();
        init_project(&dir);
        tasker(&dir)
            .arg("metrics")
            .assert()
            .success()
            .stdout(predicate::str::contains("{"));
    }

    #[test]
    fn record_verification_without_a_prior_verdict_fails() {
        let dir = create_temp_project();
        init_project(&dir);
        write_task(&dir, "T001", &minimal_task_json("T001", &[]));
        tasker(&dir)
            .arg("task")
            .arg("load")
            .arg(dir.path().join("tasks/T001.json"))
            .assert()
            .success();

        tasker(&dir)
            .arg("record-verification")
            .arg("T001")
            .arg("--actual-outcome")
            .arg("correct")
            .assert()
            .failure();
    }
}
