//! Persisted loop state types.
//!
//! This module defines the data model that survives across iterations and
//! process restarts: the active loop descriptor, the per-iteration history
//! records, and the struggle streak counters derived from them.
//!
//! Field names serialize in camelCase so the on-disk JSON stays readable
//! next to the markdown context and task files.

pub mod store;
pub mod tasks;

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Iterations shorter than this count toward the short-iteration streak.
pub const SHORT_ITERATION_MS: u64 = 30_000;

/// Repeated-error map keys are truncated to this many bytes.
const ERROR_KEY_MAX: usize = 100;

/// Descriptor of the currently running loop.
///
/// Exactly one of these may be active per project directory; a second
/// `grind loop` refuses to start while `active` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    /// Whether a loop currently owns this project directory
    pub active: bool,
    /// Current iteration number, 1-indexed
    pub iteration: u32,
    /// Iteration cap, 0 for unbounded
    pub max_iterations: u32,
    /// Phrase the agent must wrap in a promise tag to finish the loop
    pub completion_promise: String,
    /// Phrase the agent emits when a single task from the list is done
    pub task_promise: String,
    /// The operator's base prompt
    pub prompt: String,
    /// RFC 3339 timestamp of loop start
    pub started_at: String,
    /// Model override passed through to the agent, if any
    #[serde(default)]
    pub model: Option<String>,
}

impl LoopState {
    /// Create the state for a freshly started loop.
    #[must_use]
    pub fn begin(
        prompt: String,
        max_iterations: u32,
        completion_promise: String,
        task_promise: String,
        model: Option<String>,
    ) -> Self {
        Self {
            active: true,
            iteration: 1,
            max_iterations,
            completion_promise,
            task_promise,
            prompt,
            started_at: Utc::now().to_rfc3339(),
            model,
        }
    }

    /// Advance to the next iteration.
    pub fn next_iteration(&mut self) {
        self.iteration += 1;
    }
}

/// Immutable record of one completed (or degraded) iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: u32,
    /// RFC 3339 start timestamp
    pub started_at: String,
    /// RFC 3339 end timestamp
    pub ended_at: String,
    pub duration_ms: u64,
    /// Histogram of tool invocations observed in the agent output
    pub tools_used: HashMap<String, u64>,
    pub files_modified: Vec<String>,
    /// Agent exit code; -1 for timeouts and synthetic failure records
    pub exit_code: i32,
    pub completion_detected: bool,
    /// Extracted error lines, deduplicated and capped upstream
    pub errors: Vec<String>,
}

impl IterationRecord {
    /// Build a degraded record for an iteration that produced no usable
    /// result (inactivity timeout, or a non-fatal loop error).
    #[must_use]
    pub fn degraded(iteration: u32, started_at: String, duration_ms: u64, error: String) -> Self {
        Self {
            iteration,
            started_at,
            ended_at: Utc::now().to_rfc3339(),
            duration_ms,
            tools_used: HashMap::new(),
            files_modified: Vec::new(),
            exit_code: -1,
            completion_detected: false,
            errors: vec![error],
        }
    }
}

/// Append-only iteration history plus derived struggle counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub iterations: Vec<IterationRecord>,
    /// Sum of all recorded durations; only ever grows
    pub total_duration_ms: u64,
    pub struggle_indicators: StruggleIndicators,
}

impl History {
    /// Append a record, updating the running total and streak counters.
    pub fn push(&mut self, record: IterationRecord) {
        self.total_duration_ms = self.total_duration_ms.saturating_add(record.duration_ms);
        self.struggle_indicators.record(&record);
        self.iterations.push(record);
    }

    /// The last `limit` records, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> &[IterationRecord] {
        let start = self.iterations.len().saturating_sub(limit);
        &self.iterations[start..]
    }
}

/// Streak counters flagging sustained lack of progress.
///
/// These are deliberately streaks rather than rolling averages: a single
/// good iteration wipes the relevant counter, so only sustained patterns
/// surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StruggleIndicators {
    /// Truncated error line -> number of iterations it appeared in
    pub repeated_errors: HashMap<String, u32>,
    /// Consecutive iterations with an empty modified-file set
    pub no_progress_iterations: u32,
    /// Consecutive iterations shorter than [`SHORT_ITERATION_MS`]
    pub short_iterations: u32,
}

impl StruggleIndicators {
    /// Fold one iteration's outcome into the streak counters.
    pub fn record(&mut self, record: &IterationRecord) {
        if record.files_modified.is_empty() {
            self.no_progress_iterations += 1;
        } else {
            self.no_progress_iterations = 0;
        }

        if record.duration_ms < SHORT_ITERATION_MS {
            self.short_iterations += 1;
        } else {
            self.short_iterations = 0;
        }

        if record.errors.is_empty() {
            // A clean iteration resets all error-repetition memory
            self.repeated_errors.clear();
        } else {
            for error in &record.errors {
                let key = truncate(error, ERROR_KEY_MAX);
                *self.repeated_errors.entry(key).or_insert(0) += 1;
            }
        }
    }

    /// Whether any error line has recurred across iterations.
    #[must_use]
    pub fn has_repeated_errors(&self) -> bool {
        self.repeated_errors.values().any(|count| *count >= 2)
    }

    /// Errors seen at least twice, most frequent first, capped at `limit`.
    #[must_use]
    pub fn top_repeated_errors(&self, limit: usize) -> Vec<(String, u32)> {
        let mut repeated: Vec<(String, u32)> = self
            .repeated_errors
            .iter()
            .filter(|(_, count)| **count >= 2)
            .map(|(msg, count)| (msg.clone(), *count))
            .collect();
        repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        repeated.truncate(limit);
        repeated
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
