//! Single-iteration execution for `LoopRunner`.
//!
//! One call to [`LoopRunner::run_iteration`] is one full
//! invoke-and-observe cycle: snapshot, prompt, agent run, completion
//! detection, bookkeeping, and persistence.

use std::collections::HashMap;

use chrono::Utc;
use colored::Colorize;
use tracing::warn;

use super::completion;
use super::controller::{LoopRunner, ITERATION_PAUSE};
use crate::agent::line;
use crate::agent::RunOptions;
use crate::changes::ChangeTracker;
use crate::error::Result;
use crate::format;
use crate::state::{tasks, IterationRecord};
use crate::{prompt, GrindError};

/// Result surface of one iteration, reported up to the controller.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub exit_code: i32,
    pub completion_detected: bool,
    pub duration_ms: u64,
    pub tool_counts: HashMap<String, u64>,
    pub files_modified: Vec<String>,
    pub errors: Vec<String>,
}

impl LoopRunner {
    /// Execute one iteration.
    ///
    /// Inactivity timeouts degrade the iteration and return `Ok`; launch
    /// and stream failures propagate as errors for the controller to
    /// classify.
    pub(crate) async fn run_iteration(&mut self) -> Result<IterationOutcome> {
        let iteration = self.state.iteration;

        println!();
        if self.state.max_iterations > 0 {
            println!(
                "{} {iteration} / {}",
                "Iteration".bold(),
                self.state.max_iterations
            );
        } else {
            println!("{} {iteration}", "Iteration".bold());
        }
        println!("{}", "─".repeat(68));

        let pending_context = self.store.load_context();
        let before = self.changes.snapshot();

        let tasks_section = tasks::tasks_mode_section(&self.store, &self.state);
        let full_prompt =
            prompt::build_prompt(&self.state, pending_context.as_deref(), &tasks_section);

        let started_at = Utc::now().to_rfc3339();
        let started = std::time::Instant::now();

        let run = self
            .agent
            .run(&RunOptions {
                prompt: full_prompt,
                model: self.state.model.clone(),
                stream: self.options.stream_output,
                verbose_tools: self.options.verbose_tools,
                timeout: self.options.timeout,
                env: self.agent_env.clone(),
            })
            .await;

        let (result, exit_code) = match run {
            Ok(pair) => pair,
            Err(err) if err.is_timeout() => {
                return self.record_timeout(iteration, started_at, started, &err).await;
            }
            Err(err) => return Err(err),
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        let after = self.changes.snapshot();
        let files_modified = ChangeTracker::diff(&before, &after);

        let combined = result.combined();
        let completion_detected = completion::is_complete(&combined, &self.state.completion_promise);
        let errors = line::extract_errors(&combined);

        self.print_iteration_summary(duration_ms, &result.tool_counts, exit_code, completion_detected);

        let record = IterationRecord {
            iteration,
            started_at,
            ended_at: Utc::now().to_rfc3339(),
            duration_ms,
            tools_used: result.tool_counts.clone(),
            files_modified: files_modified.clone(),
            exit_code,
            completion_detected,
            errors: errors.clone(),
        };
        self.history.push(record);
        self.store.save_history(&self.history)?;

        self.warn_if_struggling();

        if completion::is_placeholder_integration(&combined) {
            eprintln!(
                "\n{} The agent loaded a placeholder integration and cannot do real work.",
                "Error:".red().bold()
            );
            return Err(GrindError::PlaceholderIntegration);
        }

        if exit_code != 0 {
            println!(
                "\n{} Agent exited with code {exit_code}. Continuing to next iteration.",
                "Warning:".yellow().bold()
            );
        }

        if self.options.auto_commit {
            let message = if completion_detected {
                format!("grind iteration {iteration}: task completed")
            } else {
                format!("grind iteration {iteration}: work in progress")
            };
            match self.changes.auto_commit(&message) {
                Ok(true) => println!("Auto-committed changes"),
                Ok(false) => {}
                Err(err) => eprintln!(
                    "{} git auto-commit failed: {err}",
                    "Warning:".yellow().bold()
                ),
            }
        }

        let outcome = IterationOutcome {
            exit_code,
            completion_detected,
            duration_ms,
            tool_counts: result.tool_counts,
            files_modified,
            errors,
        };

        if completion_detected {
            println!();
            println!("{}", "═".repeat(68));
            println!(
                "{} Completion promise detected: <promise>{}</promise>",
                "Done:".green().bold(),
                self.state.completion_promise
            );
            println!("Task completed in {iteration} iteration(s)");
            println!(
                "Total time: {}",
                format::format_duration_long(self.history.total_duration_ms)
            );
            println!("{}", "═".repeat(68));

            // History was persisted above; only now is it safe to tear
            // the loop's memory down.
            self.store.clear_state()?;
            self.store.clear_history()?;
            self.store.clear_context()?;
            return Ok(outcome);
        }

        if pending_context.is_some() {
            println!("Context was consumed this iteration");
            self.store.clear_context()?;
        }

        self.state.next_iteration();
        self.store.save_state(&self.state)?;

        tokio::time::sleep(ITERATION_PAUSE).await;

        Ok(outcome)
    }

    /// Record an inactivity timeout as a degraded iteration and keep the
    /// loop alive: the child has already been killed by the runner, a
    /// context note tells the next iteration what happened.
    async fn record_timeout(
        &mut self,
        iteration: u32,
        started_at: String,
        started: std::time::Instant,
        err: &GrindError,
    ) -> Result<IterationOutcome> {
        let duration_ms = started.elapsed().as_millis() as u64;

        println!(
            "\n{} Iteration {iteration} timed out with no agent activity.",
            "Warning:".yellow().bold()
        );

        let note = format!(
            "Iteration {iteration} timed out after a period of inactivity. \
             Please try again or take a different approach."
        );
        if let Err(save_err) = self.store.append_context(&note) {
            warn!("Failed to persist timeout context note: {save_err}");
        }

        let record =
            IterationRecord::degraded(iteration, started_at, duration_ms, err.to_string());
        let outcome = IterationOutcome {
            exit_code: record.exit_code,
            completion_detected: false,
            duration_ms,
            tool_counts: HashMap::new(),
            files_modified: Vec::new(),
            errors: record.errors.clone(),
        };

        self.history.push(record);
        self.store.save_history(&self.history)?;

        self.state.next_iteration();
        self.store.save_state(&self.state)?;

        tokio::time::sleep(ITERATION_PAUSE).await;

        Ok(outcome)
    }

    fn print_iteration_summary(
        &self,
        elapsed_ms: u64,
        tool_counts: &HashMap<String, u64>,
        exit_code: i32,
        completion_detected: bool,
    ) {
        println!();
        println!("Iteration Summary");
        println!("{}", "─".repeat(68));
        println!("Iteration: {}", self.state.iteration);
        println!("Elapsed:   {}", format::format_duration(elapsed_ms));

        let tool_summary = format::tool_summary(tool_counts, 6);
        if tool_summary.is_empty() {
            println!("Tools:     none");
        } else {
            println!("Tools:     {tool_summary}");
        }

        println!("Exit code: {exit_code}");
        println!("Completion promise: {completion_detected}");
    }

    fn warn_if_struggling(&self) {
        let indicators = &self.history.struggle_indicators;
        if self.state.iteration <= 2 {
            return;
        }
        if indicators.no_progress_iterations < 3 && indicators.short_iterations < 3 {
            return;
        }

        println!("\n{} Potential struggle detected:", "Warning:".yellow().bold());
        if indicators.no_progress_iterations >= 3 {
            println!(
                "   - No file changes in {} iterations",
                indicators.no_progress_iterations
            );
        }
        if indicators.short_iterations >= 3 {
            println!("   - {} very short iterations", indicators.short_iterations);
        }
        println!(
            "   Tip: use 'grind context add \"hint\"' in another terminal to guide the agent"
        );
    }
}
