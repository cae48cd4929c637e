//! Integration tests for specpilot
//!
//! These drive the binary end to end with `sh` standing in for the agent.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn specpilot() -> Command {
    let mut cmd = cargo_bin_cmd!("specpilot");
    cmd.env_remove("SPECPILOT_AGENT_CMD")
        .env_remove("SPECPILOT_MAX_CONCURRENT")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Write a config whose agent is `sh -c <script>` and create `specs/auth`.
fn setup_project(dir: &TempDir, script: &str) {
    let pilot_dir = dir.path().join(".specpilot");
    fs::create_dir_all(&pilot_dir).unwrap();
    fs::create_dir_all(dir.path().join("specs/auth")).unwrap();

    let config = format!(
        r#"
[execution]
timeout_check_interval_ms = 50

[agent]
command = "sh"
args = ["-c", {script:?}, "{{phase}}"]

[logging]
level = "warn"
"#
    );
    fs::write(pilot_dir.join("specpilot.toml"), config).unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        specpilot()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("audit"));
    }

    #[test]
    fn test_version() {
        specpilot().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_review_flag_rejected() {
        let dir = create_temp_project();
        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/auth", "--review", "sometimes"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        specpilot()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No specpilot.toml found"))
            .stdout(predicate::str::contains("max_concurrent = 5"));
    }

    #[test]
    fn test_config_init_creates_file() {
        let dir = create_temp_project();
        specpilot()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created specpilot.toml"));

        let path = dir.path().join(".specpilot/specpilot.toml");
        assert!(path.exists());
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[execution]"));

        specpilot()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".specpilot")).unwrap();
        fs::write(
            dir.path().join(".specpilot/specpilot.toml"),
            "[execution]\nmax_concurrent = 0\n",
        )
        .unwrap();

        specpilot()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_concurrent is 0"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".specpilot")).unwrap();
        fs::write(
            dir.path().join(".specpilot/specpilot.toml"),
            "[defaults.permissions]\nmerge = true\n",
        )
        .unwrap();

        specpilot()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_document_phases() {
        let dir = create_temp_project();
        setup_project(&dir, "exit 0");

        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/auth", "--phases", "requirements,design,tasks"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"))
            .stdout(predicate::str::contains("requirements, design, tasks"));
    }

    #[test]
    fn test_run_agent_crash_fails() {
        let dir = create_temp_project();
        setup_project(&dir, "exit 4");

        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/auth", "--phases", "design"])
            .assert()
            .failure()
            .stdout(predicate::str::contains(
                "Agent crashed during phase design with exit code 4",
            ));
    }

    #[test]
    fn test_run_review_changes_requested_pauses() {
        let dir = create_temp_project();
        setup_project(&dir, "echo '<review>changes-requested</review>'");

        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/auth", "--phases", "document-review,impl"])
            .assert()
            .success()
            .stdout(predicate::str::contains("paused"))
            .stdout(predicate::str::contains("review round: 1"));
    }

    #[test]
    fn test_run_inspection_then_merge() {
        let dir = create_temp_project();
        // `$0` is the phase passed after the script.
        setup_project(
            &dir,
            r#"[ "$0" = inspection ] && echo '<inspection>passed</inspection>'; exit 0"#,
        );

        specpilot()
            .current_dir(dir.path())
            .args([
                "run",
                "specs/auth",
                "--phases",
                "impl,inspection,deploy",
                "--auto-merge",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("merging"))
            .stdout(predicate::str::contains("impl, inspection, deploy"));
    }

    #[test]
    fn test_run_missing_unit_dir_pauses() {
        let dir = create_temp_project();
        setup_project(&dir, "exit 0");

        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/missing", "--phases", "requirements"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Failed to read spec"));
    }

    #[test]
    fn test_run_writes_audit_log() {
        let dir = create_temp_project();
        setup_project(&dir, "exit 7");

        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/auth", "--phases", "tasks"])
            .assert()
            .failure();

        assert!(dir.path().join(".specpilot/audit/events.jsonl").exists());

        specpilot()
            .current_dir(dir.path())
            .args(["audit", "--errors"])
            .assert()
            .success()
            .stdout(predicate::str::contains("execution-error"))
            .stdout(predicate::str::contains("exit code 7"));

        specpilot()
            .current_dir(dir.path())
            .args(["audit", "--unit", "specs/auth", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"event_type\":\"execute-next-phase\""));
    }
}

// =============================================================================
// Audit Tests
// =============================================================================

mod audit {
    use super::*;

    #[test]
    fn test_audit_empty_project() {
        let dir = create_temp_project();
        specpilot()
            .current_dir(dir.path())
            .arg("audit")
            .assert()
            .success()
            .stdout(predicate::str::contains("No audit records found"));
    }

    #[test]
    fn test_audit_reset() {
        let dir = create_temp_project();
        setup_project(&dir, "exit 0");
        specpilot()
            .current_dir(dir.path())
            .args(["run", "specs/auth", "--phases", "design"])
            .assert()
            .success();

        specpilot()
            .current_dir(dir.path())
            .args(["audit", "--reset"])
            .assert()
            .success();

        specpilot()
            .current_dir(dir.path())
            .arg("audit")
            .assert()
            .success()
            .stdout(predicate::str::contains("No audit records found"));
    }
}
