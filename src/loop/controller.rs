//! The top-level loop state machine.
//!
//! A loop moves from idle through active to exactly one terminal state:
//! completed, cancelled, iteration cap reached, or a fatal error. The
//! controller owns the persisted state and history for the lifetime of
//! the run, enforces the single-active-loop rule, and decides which
//! iteration errors the loop survives.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use tracing::warn;

use crate::agent::config::{self, ConfigOptions, AGENT_CONFIG_ENV};
use crate::agent::AgentRunner;
use crate::changes::ChangeTracker;
use crate::error::{GrindError, Result};
use crate::format;
use crate::state::store::StateStore;
use crate::state::{History, IterationRecord, LoopState};

/// Pause between normal iterations, so an agent that exits instantly
/// cannot spin the loop.
pub(crate) const ITERATION_PAUSE: Duration = Duration::from_secs(1);

/// Longer pause after a failed iteration, to throttle repeated failures.
pub(crate) const FAILURE_PAUSE: Duration = Duration::from_secs(2);

/// Options for one loop run.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// The operator's base prompt
    pub prompt: String,
    /// Where the prompt came from (file path), for display only
    pub prompt_source: Option<String>,
    /// Iteration cap, 0 for unbounded
    pub max_iterations: u32,
    /// Phrase that ends the loop when promised
    pub completion_promise: String,
    /// Phrase that ends one task from the list
    pub task_promise: String,
    /// Model override forwarded to the agent
    pub model: Option<String>,
    /// Agent CLI command
    pub agent_command: String,
    /// Stream agent output live
    pub stream_output: bool,
    /// Echo every tool line instead of the condensed summary
    pub verbose_tools: bool,
    /// Run the agent with non-auth plugins disabled
    pub disable_plugins: bool,
    /// Run the agent with all tool permissions pre-approved
    pub allow_all_permissions: bool,
    /// Commit working-tree changes after each iteration
    pub auto_commit: bool,
    /// Inactivity timeout; `None` disables
    pub timeout: Option<Duration>,
}

/// How a loop run ended, short of a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The completion promise was detected
    Completed {
        iterations: u32,
        total_duration_ms: u64,
    },
    /// The iteration cap was hit without completion
    MaxIterationsReached {
        limit: u32,
        total_duration_ms: u64,
    },
}

/// Drives iterations until a terminal state.
#[derive(Debug)]
pub struct LoopRunner {
    pub(crate) options: LoopOptions,
    pub(crate) store: StateStore,
    pub(crate) changes: ChangeTracker,
    pub(crate) agent: AgentRunner,
    pub(crate) state: LoopState,
    pub(crate) history: History,
    pub(crate) agent_env: Vec<(String, String)>,
}

impl LoopRunner {
    /// Start a new loop in `project_dir`.
    ///
    /// Refuses without mutating anything when a persisted state is still
    /// active, or when the agent binary cannot be found. This existence
    /// check is the only mutual exclusion between racing starts; the
    /// window between check and save is accepted for the single-operator
    /// case.
    pub fn start(project_dir: impl AsRef<Path>, options: LoopOptions) -> Result<Self> {
        let project_dir = project_dir.as_ref().to_path_buf();
        let store = StateStore::new(&project_dir);

        if let Some(existing) = store.load_state() {
            if existing.active {
                return Err(GrindError::AlreadyActive {
                    iteration: existing.iteration,
                    started_at: existing.started_at,
                    state_file: store.state_path().display().to_string(),
                });
            }
        }

        let agent = AgentRunner::new(&options.agent_command, &project_dir);
        agent.ensure_available()?;

        let mut agent_env = Vec::new();
        let config_options = ConfigOptions {
            filter_plugins: options.disable_plugins,
            allow_all_permissions: options.allow_all_permissions,
        };
        if config_options.is_needed() {
            let config_path = config::ensure_loop_config(&store, &config_options)?;
            agent_env.push((
                AGENT_CONFIG_ENV.to_string(),
                config_path.display().to_string(),
            ));
        }

        let state = LoopState::begin(
            options.prompt.clone(),
            options.max_iterations,
            options.completion_promise.clone(),
            options.task_promise.clone(),
            options.model.clone(),
        );
        store.save_state(&state)?;

        let history = store.load_history();
        store.save_history(&history)?;

        Ok(Self {
            changes: ChangeTracker::new(&project_dir),
            options,
            store,
            agent,
            state,
            history,
            agent_env,
        })
    }

    /// Print the startup banner.
    pub fn print_banner(&self) {
        println!();
        println!("{}", "grind - iterative agent loop".bold());
        println!("{}", "═".repeat(68));

        let preview = preview(&self.options.prompt, 80);
        match &self.options.prompt_source {
            Some(source) => {
                println!("Task: {source}");
                println!("Preview: {preview}");
            }
            None => println!("Task: {preview}"),
        }

        println!("Completion promise: {}", self.options.completion_promise);
        let max_display = if self.options.max_iterations > 0 {
            self.options.max_iterations.to_string()
        } else {
            "unlimited".to_string()
        };
        println!("Max iterations: {max_display}");
        if let Some(model) = &self.options.model {
            println!("Model: {model}");
        }
        if self.options.disable_plugins {
            println!("Plugins: non-auth plugins disabled");
        }
        if self.options.allow_all_permissions {
            println!("Permissions: auto-approve all tools");
        }
        if let Some(timeout) = self.options.timeout {
            println!(
                "Timeout: {}",
                format::format_duration_long(timeout.as_millis() as u64)
            );
        }

        println!();
        println!("Starting loop... (Ctrl+C to stop)");
        println!("{}", "═".repeat(68));
    }

    /// Run iterations until a terminal state.
    pub async fn run(mut self) -> Result<LoopOutcome> {
        self.spawn_cancel_handler();

        loop {
            if self.options.max_iterations > 0 && self.state.iteration > self.options.max_iterations
            {
                println!();
                println!(
                    "{} Max iterations ({}) reached. Loop stopped.",
                    "Done:".yellow().bold(),
                    self.options.max_iterations
                );
                println!(
                    "Total time: {}",
                    format::format_duration_long(self.history.total_duration_ms)
                );
                self.store.clear_state()?;
                return Ok(LoopOutcome::MaxIterationsReached {
                    limit: self.options.max_iterations,
                    total_duration_ms: self.history.total_duration_ms,
                });
            }

            let iteration = self.state.iteration;
            match self.run_iteration().await {
                Ok(outcome) if outcome.completion_detected => {
                    return Ok(LoopOutcome::Completed {
                        iterations: iteration,
                        total_duration_ms: self.history.total_duration_ms,
                    });
                }
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    eprintln!(
                        "\n{} Error in iteration {}: {}",
                        "Warning:".yellow().bold(),
                        iteration,
                        err
                    );
                    println!("Continuing to next iteration...");

                    let record = IterationRecord::degraded(
                        iteration,
                        Utc::now().to_rfc3339(),
                        0,
                        err.to_string(),
                    );
                    self.history.push(record);
                    if let Err(save_err) = self.store.save_history(&self.history) {
                        warn!("Failed to persist history after error: {save_err}");
                    }

                    self.state.next_iteration();
                    self.store.save_state(&self.state)?;

                    tokio::time::sleep(FAILURE_PAUSE).await;
                }
            }
        }
    }

    /// Cancellation is cooperative and coarse: the listener clears
    /// persisted state and exits the whole program.
    fn spawn_cancel_handler(&self) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nGracefully stopping the loop...");
                if let Err(err) = store.clear_state() {
                    warn!("Failed to clear state on cancel: {err}");
                }
                println!("Loop cancelled.");
                std::process::exit(0);
            }
        });
    }
}

fn preview(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
