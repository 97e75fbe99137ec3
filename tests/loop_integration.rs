//! End-to-end loop tests against a scripted stand-in agent.
//!
//! Each test writes a small shell script that plays the agent role, so
//! the whole chain — prompt build, process launch, stream monitoring,
//! completion detection, persistence — runs for real without any
//! network or real agent installed.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;

use grind::r#loop::{LoopOptions, LoopOutcome, LoopRunner};
use grind::state::store::StateStore;

/// Write an executable fake-agent script into `dir`.
fn fake_agent(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-agent");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn options(agent: &Path, max_iterations: u32) -> LoopOptions {
    LoopOptions {
        prompt: "build the widget".to_string(),
        prompt_source: None,
        max_iterations,
        completion_promise: "COMPLETE".to_string(),
        task_promise: "READY_FOR_NEXT_TASK".to_string(),
        model: None,
        agent_command: agent.display().to_string(),
        stream_output: false,
        verbose_tools: false,
        disable_plugins: false,
        allow_all_permissions: false,
        auto_commit: false,
        timeout: None,
    }
}

fn init_git(dir: &Path) -> bool {
    let init = Command::new("git")
        .args(["init", "-q"])
        .current_dir(dir)
        .status();
    matches!(init, Ok(status) if status.success())
}

#[tokio::test]
async fn test_loop_completes_on_promise_and_clears_state() {
    let project = TempDir::new().unwrap();
    let agent = fake_agent(
        project.path(),
        "echo \"work done\"\necho \"<promise>COMPLETE</promise>\"",
    );

    let runner = LoopRunner::start(project.path(), options(&agent, 5)).unwrap();
    let outcome = runner.run().await.expect("loop should succeed");

    match outcome {
        LoopOutcome::Completed { iterations, .. } => assert_eq!(iterations, 1),
        other => panic!("expected completion, got {other:?}"),
    }

    // Completion tears down all persisted loop memory
    let store = StateStore::new(project.path());
    assert!(store.load_state().is_none());
    assert!(!store.history_path().exists());
    assert!(store.load_context().is_none());
}

#[tokio::test]
async fn test_loop_stops_at_iteration_cap() {
    let project = TempDir::new().unwrap();
    let agent = fake_agent(project.path(), "echo \"still working\"");

    let runner = LoopRunner::start(project.path(), options(&agent, 3)).unwrap();
    let outcome = runner.run().await.expect("loop should stop at cap");

    match outcome {
        LoopOutcome::MaxIterationsReached { limit, .. } => assert_eq!(limit, 3),
        other => panic!("expected cap, got {other:?}"),
    }

    let store = StateStore::new(project.path());
    // State cleared; history survives for post-mortem inspection
    assert!(store.load_state().is_none());
    let history = store.load_history();
    assert_eq!(history.iterations.len(), 3);
    assert!(history.iterations.iter().all(|r| !r.completion_detected));
    assert!(history.iterations.iter().all(|r| r.exit_code == 0));
}

#[tokio::test]
async fn test_loop_records_files_errors_and_struggle() {
    let project = TempDir::new().unwrap();
    if !init_git(project.path()) {
        eprintln!("git unavailable; skipping");
        return;
    }
    let agent = fake_agent(
        project.path(),
        "echo \"made a file\" > artifact.txt\necho \"error: synthetic problem\"",
    );

    // Pending context must be consumed by the first iteration
    let store = StateStore::new(project.path());
    store.append_context("try the simple approach").unwrap();

    let runner = LoopRunner::start(project.path(), options(&agent, 2)).unwrap();
    runner.run().await.expect("loop should stop at cap");

    let history = store.load_history();
    assert_eq!(history.iterations.len(), 2);

    // Iteration 1 created artifact.txt; iteration 2 rewrote identical
    // content, so its modified set is empty
    let first = &history.iterations[0];
    assert!(first
        .files_modified
        .iter()
        .any(|path| path.contains("artifact.txt")));
    assert!(first
        .errors
        .iter()
        .any(|error| error.contains("error: synthetic problem")));

    let second = &history.iterations[1];
    assert!(second.files_modified.is_empty());

    // Streaks: one no-progress iteration, two short, repeated error twice
    let indicators = &history.struggle_indicators;
    assert_eq!(indicators.no_progress_iterations, 1);
    assert_eq!(indicators.short_iterations, 2);
    assert_eq!(
        indicators.repeated_errors.get("error: synthetic problem"),
        Some(&2)
    );

    assert!(store.load_context().is_none());
}

#[tokio::test]
async fn test_loop_passes_composed_prompt_to_agent() {
    let project = TempDir::new().unwrap();
    // $1 is "run", $2 the composed prompt
    let agent = fake_agent(project.path(), "printf '%s' \"$2\" > prompt-capture.txt");

    let runner = LoopRunner::start(project.path(), options(&agent, 1)).unwrap();
    runner.run().await.expect("loop should stop at cap");

    let captured = fs::read_to_string(project.path().join("prompt-capture.txt")).unwrap();
    assert!(captured.contains("build the widget"));
    assert!(captured.contains("<promise>COMPLETE</promise>"));
    assert!(captured.contains("<promise>READY_FOR_NEXT_TASK</promise>"));
    assert!(captured.contains("# Iteration 1"));
}

#[tokio::test]
async fn test_loop_survives_inactivity_timeout() {
    let project = TempDir::new().unwrap();
    let agent = fake_agent(project.path(), "sleep 30");

    let mut opts = options(&agent, 1);
    opts.stream_output = true;
    opts.timeout = Some(Duration::from_secs(2));

    let runner = LoopRunner::start(project.path(), opts).unwrap();
    let outcome = runner.run().await.expect("timeout is not loop-fatal");
    assert!(matches!(
        outcome,
        LoopOutcome::MaxIterationsReached { limit: 1, .. }
    ));

    let store = StateStore::new(project.path());
    let history = store.load_history();
    assert_eq!(history.iterations.len(), 1);

    let record = &history.iterations[0];
    assert_eq!(record.exit_code, -1);
    assert!(!record.completion_detected);
    assert_eq!(record.errors.len(), 1);
    assert!(record.errors[0].contains("timeout"));

    // The timeout left a hint for the next iteration's prompt
    let context = store.load_context().expect("timeout note persisted");
    assert!(context.contains("timed out"));
}

#[tokio::test]
async fn test_loop_counts_tool_markers_from_buffered_output() {
    let project = TempDir::new().unwrap();
    let body = r#"for i in 1 2 3 4 5; do echo "| bash ls"; done
echo "| edit main.rs"
echo "| edit lib.rs""#;
    let agent = fake_agent(project.path(), body);

    let runner = LoopRunner::start(project.path(), options(&agent, 1)).unwrap();
    runner.run().await.expect("loop should stop at cap");

    let history = StateStore::new(project.path()).load_history();
    let record = &history.iterations[0];
    assert_eq!(record.tools_used.get("bash"), Some(&5));
    assert_eq!(record.tools_used.get("edit"), Some(&2));
}
