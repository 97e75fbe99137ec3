//! Markdown task list parsing and the tasks-mode prompt section.
//!
//! The task list lives at `.grind/tasks.md` as checkbox markdown:
//!
//! ```markdown
//! - [ ] todo task
//! - [/] in-progress task
//! - [x] complete task
//!     - [ ] subtask
//! ```

use regex::Regex;

use crate::error::{GrindError, Result};
use crate::state::store::StateStore;
use crate::state::LoopState;

/// Status of a single task or subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Complete,
}

impl TaskStatus {
    fn from_marker(marker: &str) -> Self {
        match marker {
            "x" => Self::Complete,
            "/" => Self::InProgress,
            _ => Self::Todo,
        }
    }

    /// Glyph used by the status renderer.
    #[must_use]
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Complete => "[x]",
            Self::InProgress => "[/]",
            Self::Todo => "[ ]",
        }
    }
}

/// One parsed task with its subtasks.
#[derive(Debug, Clone)]
pub struct Task {
    pub text: String,
    pub status: TaskStatus,
    pub subtasks: Vec<Task>,
}

/// Parse checkbox markdown into a task list.
#[must_use]
pub fn parse_tasks(content: &str) -> Vec<Task> {
    let top_level = Regex::new(r"^- \[([ x/])\]\s*(.+)").expect("valid task regex");
    let subtask = Regex::new(r"^\s+- \[([ x/])\]\s*(.+)").expect("valid subtask regex");

    let mut tasks: Vec<Task> = Vec::new();

    for line in content.lines() {
        if let Some(caps) = top_level.captures(line) {
            tasks.push(Task {
                text: caps[2].trim().to_string(),
                status: TaskStatus::from_marker(&caps[1]),
                subtasks: Vec::new(),
            });
            continue;
        }

        if let Some(caps) = subtask.captures(line) {
            if let Some(current) = tasks.last_mut() {
                current.subtasks.push(Task {
                    text: caps[2].trim().to_string(),
                    status: TaskStatus::from_marker(&caps[1]),
                    subtasks: Vec::new(),
                });
            }
        }
    }

    tasks
}

/// Load and parse the task list; returns the tasks plus raw content.
#[must_use]
pub fn load_tasks(store: &StateStore) -> (Vec<Task>, String) {
    match store.load_tasks_file() {
        Some(content) => (parse_tasks(&content), content),
        None => (Vec::new(), String::new()),
    }
}

/// First in-progress task, if any.
#[must_use]
pub fn find_current(tasks: &[Task]) -> Option<&Task> {
    tasks.iter().find(|t| t.status == TaskStatus::InProgress)
}

/// First todo task, if any.
#[must_use]
pub fn find_next(tasks: &[Task]) -> Option<&Task> {
    tasks.iter().find(|t| t.status == TaskStatus::Todo)
}

/// True when the list is non-empty and every task is complete.
#[must_use]
pub fn all_complete(tasks: &[Task]) -> bool {
    !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Complete)
}

/// Append a new todo task to the list, creating the file if needed.
pub fn add_task(store: &StateStore, description: &str) -> Result<()> {
    let (_, content) = load_tasks(store);
    let base = if content.is_empty() {
        "# Tasks\n".to_string()
    } else {
        content.trim_end_matches('\n').to_string()
    };
    let updated = format!("{base}\n- [ ] {description}\n");
    store.save_tasks_file(&updated)
}

/// Remove the 1-indexed task and its subtask lines.
pub fn remove_task(store: &StateStore, index: usize) -> Result<()> {
    let (tasks, content) = load_tasks(store);
    if index < 1 || index > tasks.len() {
        return Err(GrindError::tasks(format!(
            "task index {} out of range (1-{})",
            index,
            tasks.len()
        )));
    }

    let top_level = Regex::new(r"^- \[([ x/])\]\s*(.+)").expect("valid task regex");
    let mut kept: Vec<&str> = Vec::new();
    let mut task_number = 0;
    let mut in_removed = false;

    for line in content.lines() {
        if top_level.is_match(line) {
            task_number += 1;
            in_removed = task_number == index;
            if in_removed {
                continue;
            }
        } else if in_removed
            && (line.starts_with(' ') || line.starts_with('\t'))
            && !line.trim().is_empty()
        {
            // Indented continuation of the removed task
            continue;
        }
        kept.push(line);
    }

    store.save_tasks_file(&(kept.join("\n") + "\n"))
}

/// Build the tasks-mode section of the iteration prompt.
///
/// Embeds the raw list, the task workflow, and instructions that tie the
/// task promise and the completion promise to list state.
#[must_use]
pub fn tasks_mode_section(store: &StateStore, state: &LoopState) -> String {
    let (tasks, content) = load_tasks(store);
    if content.trim().is_empty() {
        return format!(
            "\n## TASKS MODE: Enabled (no tasks file found)\n\n\
             Create {} with your task list, or use `grind tasks add \"description\"`.\n",
            store.tasks_path().display()
        );
    }

    let instructions = if let Some(current) = find_current(&tasks) {
        format!(
            "\nCURRENT TASK: \"{}\"\n   \
             Focus on completing this specific task.\n   \
             When done: mark it [x] in the task list and output <promise>{}</promise>",
            current.text, state.task_promise
        )
    } else if let Some(next) = find_next(&tasks) {
        format!(
            "\nNEXT TASK: \"{}\"\n   \
             Mark it [/] in the task list before starting.\n   \
             When done: mark it [x] and output <promise>{}</promise>",
            next.text, state.task_promise
        )
    } else if all_complete(&tasks) {
        format!(
            "\nALL TASKS COMPLETE.\n   Output <promise>{}</promise> to finish.",
            state.completion_promise
        )
    } else {
        "\nNo tasks found. Add tasks to the task list or use `grind tasks add`.".to_string()
    };

    format!(
        "\n## TASKS MODE: Working through task list\n\n\
         Current tasks:\n```markdown\n{}\n```\n{}\n\n\
         ### Task Workflow\n\
         1. Find any task marked [/] (in progress). If none, pick the first [ ] task.\n\
         2. Mark the task as [/] before starting.\n\
         3. Complete the task.\n\
         4. Mark it [x] when verified complete.\n\
         5. Output <promise>{}</promise> to move to the next task.\n\
         6. Only output <promise>{}</promise> when ALL tasks are [x].\n\n\
         ---\n",
        content.trim(),
        instructions,
        state.task_promise,
        state.completion_promise
    )
}
