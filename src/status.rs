//! Operator-facing status rendering.
//!
//! `grind status` shows the active loop, pending context, the task list,
//! recent history, and any struggle indicators — everything an operator
//! needs to decide whether to intervene with a hint.

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::format;
use crate::state::store::StateStore;
use crate::state::tasks::{self, TaskStatus};
use crate::state::{History, StruggleIndicators};

/// Print the full status report for one project directory.
pub fn print_status(store: &StateStore) {
    println!();
    println!("{}", "grind status".bold());
    println!("{}", "═".repeat(68));

    let state = store.load_state();
    let history = store.load_history();

    match &state {
        Some(state) if state.active => {
            println!("{} ACTIVE LOOP", "●".green());
            print!("   Iteration:    {}", state.iteration);
            if state.max_iterations > 0 {
                println!(" / {}", state.max_iterations);
            } else {
                println!(" (unlimited)");
            }
            println!("   Started:      {}", state.started_at);
            if let Ok(started) = DateTime::parse_from_rfc3339(&state.started_at) {
                let elapsed = Utc::now().signed_duration_since(started);
                let elapsed_ms = elapsed.num_milliseconds().max(0) as u64;
                println!("   Elapsed:      {}", format::format_duration_long(elapsed_ms));
            }
            println!("   Promise:      {}", state.completion_promise);
            println!("   Task promise: {}", state.task_promise);
            if let Some(model) = &state.model {
                println!("   Model:        {model}");
            }
            println!("   Prompt:       {}", preview(&state.prompt, 60));
        }
        _ => println!("{} No active loop", "○".dimmed()),
    }

    print_tasks(store);

    if let Some(context) = store.load_context() {
        println!("\n{}", "PENDING CONTEXT (injected next iteration):".bold());
        for line in context.lines() {
            println!("   {line}");
        }
    }

    print_history(&history);

    println!();
}

fn print_tasks(store: &StateStore) {
    let (tasks, _) = tasks::load_tasks(store);
    if tasks.is_empty() {
        return;
    }

    println!("\n{}", "CURRENT TASKS:".bold());
    for (index, task) in tasks.iter().enumerate() {
        println!("   {}. {} {}", index + 1, glyph_colored(task.status), task.text);
        for subtask in &task.subtasks {
            println!("      {} {}", glyph_colored(subtask.status), subtask.text);
        }
    }

    let complete = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Complete)
        .count();
    let in_progress = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .count();
    println!(
        "\n   Progress: {complete}/{} complete, {in_progress} in progress",
        tasks.len()
    );
}

fn print_history(history: &History) {
    if history.iterations.is_empty() {
        return;
    }

    println!(
        "\n{} ({} iterations)",
        "HISTORY".bold(),
        history.iterations.len()
    );
    println!(
        "   Total time:   {}",
        format::format_duration_long(history.total_duration_ms)
    );

    println!("\n   Recent iterations:");
    for record in history.recent(5) {
        let status = if record.completion_detected {
            "done".green()
        } else if record.exit_code != 0 {
            "fail".red()
        } else {
            "work".normal()
        };
        let tool_summary = format::tool_summary(&record.tools_used, 3);
        let tool_display = if tool_summary.is_empty() {
            "no tools".to_string()
        } else {
            tool_summary
        };
        println!(
            "   [{status}] #{}: {} | {tool_display}",
            record.iteration,
            format::format_duration_long(record.duration_ms)
        );
    }

    print_struggle(&history.struggle_indicators);
}

fn print_struggle(indicators: &StruggleIndicators) {
    let struggling = indicators.no_progress_iterations >= 3
        || indicators.short_iterations >= 3
        || indicators.has_repeated_errors();
    if !struggling {
        return;
    }

    println!("\n{}", "STRUGGLE INDICATORS:".yellow().bold());
    if indicators.no_progress_iterations >= 3 {
        println!(
            "   - No file changes in {} iterations",
            indicators.no_progress_iterations
        );
    }
    if indicators.short_iterations >= 3 {
        println!(
            "   - {} very short iterations (< 30s)",
            indicators.short_iterations
        );
    }
    for (message, count) in indicators.top_repeated_errors(3) {
        println!("   - Same error {count}x: \"{}\"", preview(&message, 50));
    }
    println!("\n   Consider: grind context add \"your hint here\"");
}

fn glyph_colored(status: TaskStatus) -> String {
    match status {
        TaskStatus::Complete => status.glyph().green().to_string(),
        TaskStatus::InProgress => status.glyph().yellow().to_string(),
        TaskStatus::Todo => status.glyph().normal().to_string(),
    }
}

fn preview(text: &str, max_len: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.len() <= max_len {
        return flat;
    }
    let mut end = max_len;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}
