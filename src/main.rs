//! Grind - iterative coding-agent loop driver.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use grind::r#loop::{LoopOptions, LoopOutcome, LoopRunner};
use grind::state::store::StateStore;
use grind::state::tasks;
use grind::{format, status};

#[derive(Parser)]
#[command(name = "grind")]
#[command(version = "0.1.0")]
#[command(about = "Run a coding agent in a loop until the task is done", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the iteration loop
    Loop {
        /// Task description, or a path to a file containing it
        prompt: Option<String>,

        /// Read the prompt from a file
        #[arg(short = 'f', long)]
        prompt_file: Option<PathBuf>,

        /// Maximum iterations before stopping (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        max_iterations: u32,

        /// Phrase that signals the whole task is complete
        #[arg(long, default_value = "COMPLETE")]
        completion_promise: String,

        /// Phrase that signals one task from the list is complete
        #[arg(long, default_value = "READY_FOR_NEXT_TASK")]
        task_promise: String,

        /// Model to pass through to the agent
        #[arg(long)]
        model: Option<String>,

        /// Agent CLI command to drive
        #[arg(long, default_value = "opencode", env = "GRIND_AGENT")]
        agent: String,

        /// Buffer agent output and print at the end
        #[arg(long)]
        no_stream: bool,

        /// Print every tool line instead of the condensed summary
        #[arg(long)]
        verbose_tools: bool,

        /// Disable non-auth agent plugins for this run
        #[arg(long)]
        no_plugins: bool,

        /// Auto-approve all agent tool permissions
        #[arg(long)]
        allow_all: bool,

        /// Don't auto-commit after each iteration
        #[arg(long)]
        no_commit: bool,

        /// Inactivity timeout, e.g. 30m or 1h (0 to disable)
        #[arg(long, default_value = "1h")]
        timeout: String,
    },

    /// Show current loop status and history
    Status,

    /// Manage the context injected into the next iteration
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Manage the task list
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    /// Add a hint for the next iteration
    Add {
        /// The context or hint text
        text: String,
    },

    /// Show the pending context
    Show,

    /// Clear any pending context
    Clear,
}

#[derive(Subcommand)]
enum TasksAction {
    /// Display the current task list
    List,

    /// Add a new task to the list
    Add {
        /// Task description
        text: String,
    },

    /// Remove task at index N (1-based)
    Remove {
        /// Task index
        index: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "grind=debug,info"
    } else {
        "grind=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());
    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let store = StateStore::new(&project_path);

    match cli.command {
        Commands::Loop {
            prompt,
            prompt_file,
            max_iterations,
            completion_promise,
            task_promise,
            model,
            agent,
            no_stream,
            verbose_tools,
            no_plugins,
            allow_all,
            no_commit,
            timeout,
        } => {
            let (prompt, prompt_source) = resolve_prompt(prompt, prompt_file)?;

            let timeout = match format::parse_timeout(&timeout) {
                Ok(parsed) => parsed,
                Err(message) => {
                    eprintln!("{} {message}", "Error:".red().bold());
                    std::process::exit(1);
                }
            };

            let options = LoopOptions {
                prompt,
                prompt_source,
                max_iterations,
                completion_promise,
                task_promise,
                model,
                agent_command: agent,
                stream_output: !no_stream,
                verbose_tools: verbose_tools || cli.verbose,
                disable_plugins: no_plugins,
                allow_all_permissions: allow_all,
                auto_commit: !no_commit,
                timeout,
            };

            let runner = match LoopRunner::start(&project_path, options) {
                Ok(runner) => runner,
                Err(err) => {
                    eprintln!("{} {err}", "Error:".red().bold());
                    std::process::exit(err.exit_code());
                }
            };
            runner.print_banner();

            match runner.run().await {
                Ok(LoopOutcome::Completed { iterations, .. }) => {
                    tracing::debug!("Loop completed after {iterations} iteration(s)");
                }
                Ok(LoopOutcome::MaxIterationsReached { .. }) => {}
                Err(err) => {
                    eprintln!("{} {err}", "Fatal:".red().bold());
                    // A retried run must start clean
                    let _ = store.clear_state();
                    std::process::exit(err.exit_code());
                }
            }
        }

        Commands::Status => status::print_status(&store),

        Commands::Context { action } => match action {
            ContextAction::Add { text } => {
                store.append_context(&text)?;
                println!("{} Context added for next iteration", "OK:".green().bold());
                println!("   File: {}", store.context_path().display());
                match store.load_state() {
                    Some(state) if state.active => {
                        println!("   Will be picked up in iteration {}", state.iteration + 1);
                    }
                    _ => println!("   Will be used when a loop starts"),
                }
            }
            ContextAction::Show => match store.load_context() {
                Some(context) => println!("{context}"),
                None => println!("No pending context"),
            },
            ContextAction::Clear => {
                store.clear_context()?;
                println!("{} Context cleared", "OK:".green().bold());
            }
        },

        Commands::Tasks { action } => match action {
            TasksAction::List => {
                let (task_list, _) = tasks::load_tasks(&store);
                if task_list.is_empty() {
                    println!("No tasks found. Use 'grind tasks add' to create your first task.");
                } else {
                    println!("Current tasks:");
                    for (index, task) in task_list.iter().enumerate() {
                        println!("{}. {} {}", index + 1, task.status.glyph(), task.text);
                        for subtask in &task.subtasks {
                            println!("   {} {}", subtask.status.glyph(), subtask.text);
                        }
                    }
                }
            }
            TasksAction::Add { text } => {
                tasks::add_task(&store, &text)?;
                println!("{} Task added: \"{text}\"", "OK:".green().bold());
            }
            TasksAction::Remove { index } => {
                if let Err(err) = tasks::remove_task(&store, index) {
                    eprintln!("{} {err}", "Error:".red().bold());
                    std::process::exit(1);
                }
                println!("{} Removed task {index} and its subtasks", "OK:".green().bold());
            }
        },
    }

    Ok(())
}

/// Resolve the loop prompt from the positional argument or a file.
///
/// A positional argument naming an existing file is read as the prompt,
/// matching the common `grind loop ./prompt.md` invocation.
fn resolve_prompt(
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
) -> anyhow::Result<(String, Option<String>)> {
    if let Some(path) = prompt_file {
        let content = std::fs::read_to_string(&path).map_err(|_| {
            anyhow::anyhow!("prompt file not found: {}", path.display())
        })?;
        return Ok((content, Some(path.display().to_string())));
    }

    let Some(prompt) = prompt else {
        eprintln!("{} No prompt provided", "Error:".red().bold());
        eprintln!("Usage: grind loop \"Your task description\" [options]");
        eprintln!("Run 'grind loop --help' for more information");
        std::process::exit(1);
    };

    if let Ok(content) = std::fs::read_to_string(&prompt) {
        return Ok((content, Some(prompt)));
    }

    Ok((prompt, None))
}
