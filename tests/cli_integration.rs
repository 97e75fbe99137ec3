//! Integration tests for the grind CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the grind binary
fn grind() -> Command {
    Command::new(cargo::cargo_bin!("grind"))
}

#[test]
fn test_help() {
    grind()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Run a coding agent in a loop until the task is done",
        ));
}

#[test]
fn test_version() {
    grind()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_status_without_loop() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active loop"));
}

#[test]
fn test_context_add_and_show() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["context", "add", "Focus on the auth module"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Context added"));

    assert!(temp.path().join(".grind/context.md").exists());

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["context", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Focus on the auth module"));
}

#[test]
fn test_context_clear() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["context", "add", "hint"])
        .assert()
        .success();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["context", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Context cleared"));

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["context", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending context"));
}

#[test]
fn test_tasks_add_list_remove() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["tasks", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks found"));

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["tasks", "add", "write the parser"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Task added"));

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["tasks", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. [ ] write the parser"));

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["tasks", "remove", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed task 1"));

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["tasks", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks found"));
}

#[test]
fn test_tasks_remove_out_of_range_fails() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["tasks", "remove", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_loop_requires_prompt() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .arg("loop")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No prompt provided"));
}

#[test]
fn test_loop_refuses_missing_agent() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args([
            "loop",
            "do something",
            "--agent",
            "definitely-not-a-real-agent-binary",
        ])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Agent command not found"));
}

#[test]
fn test_loop_refuses_when_already_active() {
    let temp = TempDir::new().unwrap();
    let state_dir = temp.path().join(".grind");
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(
        state_dir.join("loop.state.json"),
        r#"{
            "active": true,
            "iteration": 4,
            "maxIterations": 0,
            "completionPromise": "COMPLETE",
            "taskPromise": "READY_FOR_NEXT_TASK",
            "prompt": "existing task",
            "startedAt": "2026-01-01T00:00:00Z",
            "model": null
        }"#,
    )
    .unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["loop", "another task"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("already active"));

    // The refusal must not mutate the existing state
    let state = std::fs::read_to_string(state_dir.join("loop.state.json")).unwrap();
    assert!(state.contains("existing task"));
}

#[test]
fn test_loop_rejects_invalid_timeout() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["loop", "task", "--timeout", "5parsecs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid duration"));
}

#[test]
fn test_loop_missing_prompt_file_fails() {
    let temp = TempDir::new().unwrap();

    grind()
        .arg("--project")
        .arg(temp.path())
        .args(["loop", "--prompt-file", "/nonexistent/prompt.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("prompt file not found"));
}
