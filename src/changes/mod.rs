//! Working-tree change detection for iteration bookkeeping.
//!
//! Snapshots fingerprint every tracked plus modified/untracked file before
//! and after an agent run; the diff of two snapshots is the iteration's
//! modified-file set. Detection degrades to empty snapshots on any
//! enumeration failure so a missing or broken git setup never blocks the
//! loop.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{GrindError, Result};

/// Fingerprint map of a working tree at a point in time.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    /// path -> content fingerprint
    pub files: HashMap<String, String>,
}

/// Snapshots and diffs one project directory's working tree.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    project_dir: PathBuf,
}

impl ChangeTracker {
    /// Create a tracker for the given directory.
    #[must_use]
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Capture a fingerprint snapshot of the working tree.
    ///
    /// Enumerates `git status --porcelain` plus `git ls-files`; any
    /// enumeration failure yields an empty snapshot instead of an error.
    #[must_use]
    pub fn snapshot(&self) -> FileSnapshot {
        let mut snapshot = FileSnapshot::default();

        let Some(status) = self.git_stdout(&["status", "--porcelain"]) else {
            return snapshot;
        };
        let Some(tracked) = self.git_stdout(&["ls-files"]) else {
            return snapshot;
        };

        let mut paths: HashSet<String> = HashSet::new();
        for line in status.lines() {
            if line.len() >= 4 {
                let path = line[3..].trim();
                if !path.is_empty() {
                    paths.insert(path.to_string());
                }
            }
        }
        for line in tracked.lines() {
            let path = line.trim();
            if !path.is_empty() {
                paths.insert(path.to_string());
            }
        }

        for path in paths {
            if let Some(fingerprint) = self.fingerprint(&path) {
                snapshot.files.insert(path, fingerprint);
            }
        }

        snapshot
    }

    /// Every path whose fingerprint differs between snapshots, plus every
    /// path present in `before` but gone from `after`. No ordering
    /// guarantee.
    #[must_use]
    pub fn diff(before: &FileSnapshot, after: &FileSnapshot) -> Vec<String> {
        let mut changed = Vec::new();

        for (path, fingerprint) in &after.files {
            match before.files.get(path) {
                Some(previous) if previous == fingerprint => {}
                _ => changed.push(path.clone()),
            }
        }

        for path in before.files.keys() {
            if !after.files.contains_key(path) {
                changed.push(path.clone());
            }
        }

        changed
    }

    /// Stage and commit all working-tree changes.
    ///
    /// Returns `Ok(false)` without committing when the tree is clean.
    pub fn auto_commit(&self, message: &str) -> Result<bool> {
        let Some(status) = self.git_stdout(&["status", "--porcelain"]) else {
            // Not a repository; nothing to commit
            return Ok(false);
        };
        if status.trim().is_empty() {
            return Ok(false);
        }

        let add = Command::new("git")
            .args(["add", "-A"])
            .current_dir(&self.project_dir)
            .output()
            .map_err(|e| GrindError::git("add", e.to_string()))?;
        if !add.status.success() {
            return Err(GrindError::git(
                "add",
                String::from_utf8_lossy(&add.stderr).trim().to_string(),
            ));
        }

        let commit = Command::new("git")
            .args(["commit", "-m", message])
            .current_dir(&self.project_dir)
            .output()
            .map_err(|e| GrindError::git("commit", e.to_string()))?;
        if !commit.status.success() {
            return Err(GrindError::git(
                "commit",
                String::from_utf8_lossy(&commit.stderr).trim().to_string(),
            ));
        }

        Ok(true)
    }

    /// Fingerprint one file: git blob hash, then sha256 of content, then
    /// mtime seconds. `None` when the file cannot be read at all.
    ///
    /// Untracked directories appear in porcelain output as `dir/` entries;
    /// they are not files and are skipped.
    fn fingerprint(&self, path: &str) -> Option<String> {
        let full_path = self.project_dir.join(path);
        if full_path.is_dir() {
            return None;
        }

        if let Some(hash) = self.git_stdout(&["hash-object", path]) {
            let hash = hash.trim();
            if !hash.is_empty() {
                return Some(hash.to_string());
            }
        }

        if let Ok(content) = std::fs::read(&full_path) {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            return Some(hex::encode(hasher.finalize()));
        }

        let metadata = std::fs::metadata(&full_path).ok()?;
        let mtime = metadata.modified().ok()?;
        let seconds = mtime.duration_since(UNIX_EPOCH).ok()?.as_secs();
        Some(format!("mtime:{seconds}"))
    }

    fn git_stdout(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.project_dir)
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("git {:?} failed in {}", args, self.project_dir.display());
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
