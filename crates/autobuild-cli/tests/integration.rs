#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn autobuild(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("autobuild").unwrap();
    cmd.current_dir(dir.path()).env("AUTOBUILD_ROOT", dir.path());
    cmd
}

const SPEC_MD: &str = "# Add login\n\n## Overview\n\nAdd a login form backed by the existing session store so users can sign in with email and password.\n\n## Requirements\n\n- Login form\n";

fn plan_json(statuses: &[&str]) -> String {
    let chunks: Vec<serde_json::Value> = statuses
        .iter()
        .enumerate()
        .map(|(i, s)| serde_json::json!({"id": format!("1.{}", i + 1), "description": format!("chunk {}", i + 1), "status": s}))
        .collect();
    serde_json::json!({
        "feature": "Add login",
        "workflow_type": "feature",
        "phases": [{"phase": 1, "name": "Implementation", "depends_on": [], "chunks": chunks}]
    })
    .to_string()
}

/// Write `.auto-claude/specs/<name>` with a spec and a plan.
fn make_spec(dir: &TempDir, name: &str, statuses: &[&str]) -> PathBuf {
    let spec_dir = dir.path().join(".auto-claude/specs").join(name);
    std::fs::create_dir_all(&spec_dir).unwrap();
    std::fs::write(spec_dir.join("spec.md"), SPEC_MD).unwrap();
    std::fs::write(spec_dir.join("implementation_plan.json"), plan_json(statuses)).unwrap();
    spec_dir
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").output().unwrap();
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// autobuild check
// ---------------------------------------------------------------------------

#[test]
fn check_allows_plain_commands() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["check", "ls -la && cargo test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("allowed"));
}

#[test]
fn check_denies_dangerous_commands() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["check", "dropdb production"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("blocked"));
}

#[test]
fn hook_ignores_other_tools() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["check", "--hook"])
        .write_stdin(r#"{"tool_name": "Write", "tool_input": {"file_path": "a.txt"}}"#)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn hook_denies_with_decision_json() {
    let dir = TempDir::new().unwrap();
    let out = autobuild(&dir)
        .args(["check", "--hook"])
        .write_stdin(r#"{"tool_name": "Bash", "tool_input": {"command": "dropdb production"}}"#)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let decision: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(decision["hookSpecificOutput"]["permissionDecision"], "deny");
    assert!(!out.stderr.is_empty());
}

// ---------------------------------------------------------------------------
// autobuild spec list
// ---------------------------------------------------------------------------

#[test]
fn spec_list_empty() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["spec", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No specs"));
}

#[test]
fn spec_list_shows_progress_and_review() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["completed", "pending"]);

    autobuild(&dir)
        .args(["spec", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("001-add-login"))
        .stdout(predicate::str::contains("1/2"))
        .stdout(predicate::str::contains("unreviewed"));

    let specs = stdout_json(autobuild(&dir).args(["spec", "list"]));
    assert_eq!(specs[0]["name"], "001-add-login");
    assert_eq!(specs[0]["chunks_total"], 2);
}

#[test]
fn interactive_spec_cancels_before_any_phase() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["spec", "create"])
        .write_stdin("\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("What do you want to build?"))
        .stderr(predicate::str::contains("User cancelled"));
    let pending = dir.path().join(".auto-claude/specs/001-pending");
    assert!(!pending.join("requirements.json").exists());
}

// ---------------------------------------------------------------------------
// autobuild review
// ---------------------------------------------------------------------------

#[test]
fn review_show_lists_choices() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["pending"]);

    autobuild(&dir)
        .args(["review", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login form backed by"))
        .stdout(predicate::str::contains("not approved"))
        .stdout(predicate::str::contains("autobuild review 001-add-login approve"));
}

#[test]
fn review_approve_then_edit_goes_stale() {
    let dir = TempDir::new().unwrap();
    let spec_dir = make_spec(&dir, "001-add-login", &["pending"]);

    autobuild(&dir)
        .args(["review", "001", "approve", "--by", "alice"])
        .assert()
        .success();

    let status = stdout_json(autobuild(&dir).args(["review", "001-add-login", "status"]));
    assert_eq!(status["approved"], true);
    assert_eq!(status["valid"], true);
    assert_eq!(status["approved_by"], "alice");

    std::fs::write(spec_dir.join("spec.md"), format!("{SPEC_MD}\n- Remember me\n")).unwrap();

    autobuild(&dir)
        .args(["review", "001-add-login", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("re-approval required"));
    autobuild(&dir)
        .args(["spec", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stale"));
}

#[test]
fn review_feedback_and_reject() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["pending"]);

    autobuild(&dir)
        .args(["review", "001-add-login", "feedback", "Use the shared form component"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 total"));
    autobuild(&dir)
        .args(["review", "001-add-login", "reject"])
        .assert()
        .success();

    let status = stdout_json(autobuild(&dir).args(["review", "001-add-login", "status"]));
    assert_eq!(status["approved"], false);
    assert_eq!(status["feedback_count"], 1);
}

#[test]
fn review_unknown_spec_fails() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["review", "404"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));
}

// ---------------------------------------------------------------------------
// autobuild build
// ---------------------------------------------------------------------------

#[test]
fn build_blocks_unapproved_spec() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["pending"]);

    autobuild(&dir)
        .args(["build", "001-add-login", "--direct"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not approved"));
}

#[test]
fn build_blocks_stale_approval() {
    let dir = TempDir::new().unwrap();
    let spec_dir = make_spec(&dir, "001-add-login", &["pending"]);
    autobuild(&dir)
        .args(["review", "001-add-login", "approve"])
        .assert()
        .success();
    std::fs::write(spec_dir.join("spec.md"), "# Rewritten\n").unwrap();

    autobuild(&dir)
        .args(["build", "001-add-login", "--direct"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("changed after it was approved"));
}

#[test]
fn forced_build_of_finished_plan_completes() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["completed", "completed"]);

    autobuild(&dir)
        .args(["build", "001-add-login", "--force", "--direct", "--skip-qa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QA skipped"));

    let status: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(".auto-claude-status")).unwrap(),
    )
    .unwrap();
    assert_eq!(status["state"], "complete");
    assert_eq!(status["active"], false);
    assert_eq!(status["chunks_completed"], 2);
}

#[test]
fn isolated_build_needs_git() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["pending"]);

    autobuild(&dir)
        .args(["build", "001-add-login", "--force"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--direct"));
}

// ---------------------------------------------------------------------------
// autobuild qa status
// ---------------------------------------------------------------------------

#[test]
fn qa_status_reports_history() {
    let dir = TempDir::new().unwrap();
    let spec_dir = make_spec(&dir, "001-add-login", &["completed"]);
    let mut plan: serde_json::Value = serde_json::from_str(&plan_json(&["completed"])).unwrap();
    plan["qa_signoff"] = serde_json::json!({"status": "approved", "qa_session": 2});
    plan["qa_iteration_history"] = serde_json::json!([
        {"iteration": 1, "status": "rejected", "issues": [{"title": "Missing CSRF token"}], "timestamp": "2026-01-01T00:00:00Z"},
        {"iteration": 2, "status": "approved", "issues": [], "timestamp": "2026-01-01T00:10:00Z"}
    ]);
    std::fs::write(spec_dir.join("implementation_plan.json"), plan.to_string()).unwrap();

    autobuild(&dir)
        .args(["qa", "status", "001-add-login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QA: approved (session 2)"))
        .stdout(predicate::str::contains("Missing CSRF token"))
        .stdout(predicate::str::contains("50%"));

    let json = stdout_json(autobuild(&dir).args(["qa", "status", "001-add-login"]));
    assert_eq!(json["summary"]["total_issues"], 1);
    assert_eq!(json["summary"]["iterations_rejected"], 1);
}

#[test]
fn qa_status_without_runs() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["pending"]);
    autobuild(&dir)
        .args(["qa", "status", "001-add-login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QA: not run"));
}

// ---------------------------------------------------------------------------
// autobuild followup
// ---------------------------------------------------------------------------

#[test]
fn followup_requires_finished_build() {
    let dir = TempDir::new().unwrap();
    let spec_dir = make_spec(&dir, "001-add-login", &["completed", "pending"]);

    autobuild(&dir)
        .args(["followup", "001-add-login", "Add a logout button"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("completed build"));
    assert!(!spec_dir.join("FOLLOWUP_REQUEST.md").exists());
}

// ---------------------------------------------------------------------------
// autobuild config
// ---------------------------------------------------------------------------

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("defaults"))
        .stdout(predicate::str::contains("max_iterations"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No warnings"));

    std::fs::create_dir_all(dir.path().join(".auto-claude")).unwrap();
    std::fs::write(
        dir.path().join(".auto-claude/config.yaml"),
        "qa:\n  max_iterations: 0\n",
    )
    .unwrap();
    autobuild(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

// ---------------------------------------------------------------------------
// autobuild workspace
// ---------------------------------------------------------------------------

#[test]
fn workspace_list_empty() {
    let dir = TempDir::new().unwrap();
    autobuild(&dir)
        .args(["workspace", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No worktrees"));
}

#[test]
fn workspace_review_without_worktree_fails() {
    let dir = TempDir::new().unwrap();
    make_spec(&dir, "001-add-login", &["completed"]);
    autobuild(&dir)
        .args(["workspace", "review", "001-add-login"])
        .assert()
        .failure();
}
