//! File-backed persistence for loop state, history, and pending context.
//!
//! All files live under `.grind/` in the project directory. Writes go
//! through a lock file plus tmp-file-and-rename so a crash mid-save never
//! leaves a half-written JSON document behind; unreadable files load as
//! absent rather than failing the loop.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tracing::warn;

use crate::error::{GrindError, Result};
use crate::state::{History, LoopState};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".grind";

const STATE_FILE: &str = "loop.state.json";
const HISTORY_FILE: &str = "history.json";
const CONTEXT_FILE: &str = "context.md";
const TASKS_FILE: &str = "tasks.md";
const AGENT_CONFIG_FILE: &str = "agent.config.json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// Persistence manager for one project directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `<project>/.grind`.
    #[must_use]
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: project_dir.as_ref().join(STATE_DIR),
        }
    }

    /// Returns the state directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the loop state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Returns the path to the history file.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Returns the path to the pending context file.
    #[must_use]
    pub fn context_path(&self) -> PathBuf {
        self.dir.join(CONTEXT_FILE)
    }

    /// Returns the path to the task list file.
    #[must_use]
    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    /// Returns the path to the generated agent config file.
    #[must_use]
    pub fn agent_config_path(&self) -> PathBuf {
        self.dir.join(AGENT_CONFIG_FILE)
    }

    // =========================================================================
    // Loop state
    // =========================================================================

    /// Loads the persisted loop state, treating missing or unreadable
    /// files as absent.
    #[must_use]
    pub fn load_state(&self) -> Option<LoopState> {
        self.load_json(&self.state_path())
    }

    /// Saves the loop state atomically.
    pub fn save_state(&self, state: &LoopState) -> Result<()> {
        self.write_json(&self.state_path(), state)
    }

    /// Deletes the loop state file if it exists.
    pub fn clear_state(&self) -> Result<()> {
        remove_if_exists(&self.state_path())
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Loads iteration history, falling back to an empty history when the
    /// file is missing or unreadable.
    #[must_use]
    pub fn load_history(&self) -> History {
        self.load_json(&self.history_path()).unwrap_or_default()
    }

    /// Saves iteration history atomically.
    pub fn save_history(&self, history: &History) -> Result<()> {
        self.write_json(&self.history_path(), history)
    }

    /// Deletes the history file if it exists.
    pub fn clear_history(&self) -> Result<()> {
        remove_if_exists(&self.history_path())
    }

    // =========================================================================
    // Pending context
    // =========================================================================

    /// Loads the pending context, trimmed; empty or missing files yield
    /// `None`.
    #[must_use]
    pub fn load_context(&self) -> Option<String> {
        let content = fs::read_to_string(self.context_path()).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Appends a timestamped context entry for the next iteration.
    pub fn append_context(&self, context: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let entry = format!(
            "\n## Context added at {}\n{}\n",
            Utc::now().to_rfc3339(),
            context
        );
        let content = match self.load_context() {
            Some(existing) => format!("{existing}{entry}"),
            None => format!("# Loop Context\n{entry}"),
        };

        self.write_atomic(&self.context_path(), content.as_bytes())
    }

    /// Deletes the pending context file if it exists.
    pub fn clear_context(&self) -> Result<()> {
        remove_if_exists(&self.context_path())
    }

    // =========================================================================
    // Task list
    // =========================================================================

    /// Loads the raw task list markdown, if present.
    #[must_use]
    pub fn load_tasks_file(&self) -> Option<String> {
        fs::read_to_string(self.tasks_path()).ok()
    }

    /// Saves the task list markdown.
    pub fn save_tasks_file(&self, content: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.write_atomic(&self.tasks_path(), content.as_bytes())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn load_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Unreadable state file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    "Corrupted state file {}: {}. Treating as absent.",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value)?;
        self.write_atomic(path, json.as_bytes())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let lock_path = path.with_extension(format!(
            "{}{}",
            path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            LOCK_SUFFIX
        ));
        let lock_file = File::create(&lock_path)?;
        FileExt::lock_exclusive(&lock_file)
            .map_err(|e| GrindError::state(format!("failed to acquire state lock: {e}")))?;

        let tmp_path = path.with_extension(format!(
            "{}{}",
            path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            TMP_SUFFIX
        ));
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(bytes)?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
