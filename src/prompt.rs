//! Iteration prompt assembly.
//!
//! Each iteration sends the agent a freshly composed prompt: the
//! iteration header, any operator-added context, the tasks-mode section,
//! the main goal, and the rules that tie the promise tags to real
//! completion. Composition is deterministic so the completion detector's
//! expectations always match what the agent was told to emit.

use crate::state::LoopState;

/// Build the full prompt for the current iteration.
#[must_use]
pub fn build_prompt(state: &LoopState, context: Option<&str>, tasks_section: &str) -> String {
    let context_section = match context {
        Some(context) => format!(
            "\n## Additional Context (added by user mid-loop)\n\n{context}\n\n---\n"
        ),
        None => String::new(),
    };

    let prompt = format!(
        "# Iteration {iteration}\n\n\
         You are in an iterative development loop working through a task list.\n\
         {context_section}{tasks_section}\n\
         ## Your Main Goal\n\n\
         {goal}\n\n\
         ## Critical Rules\n\n\
         - Work on ONE task at a time from the task list\n\
         - ONLY output <promise>{task_promise}</promise> when the current task is complete and marked in the task list\n\
         - ONLY output <promise>{completion_promise}</promise> when ALL tasks are truly done\n\
         - Do NOT lie or output false promises to exit the loop\n\
         - If stuck, try a different approach\n\
         - Check your work before claiming completion\n\n\
         ## Current Iteration: {iteration}{max_display}\n\n\
         Now, work on the current task.",
        iteration = state.iteration,
        context_section = context_section,
        tasks_section = tasks_section,
        goal = state.prompt,
        task_promise = state.task_promise,
        completion_promise = state.completion_promise,
        max_display = format_max_iterations(state.max_iterations),
    );

    prompt.trim().to_string()
}

fn format_max_iterations(max_iterations: u32) -> String {
    if max_iterations > 0 {
        format!(" / {max_iterations}")
    } else {
        " (unlimited)".to_string()
    }
}
