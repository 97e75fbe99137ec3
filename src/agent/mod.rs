//! External agent process management.
//!
//! This module owns everything between "we have a prompt" and "we have
//! the agent's output": spawning the agent CLI, wiring its pipes into the
//! stream monitor, and making sure the child never outlives a failed run.

pub mod config;
pub mod line;
pub mod stream;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{GrindError, Result};
use self::stream::{MonitorOptions, StreamResult};

/// Options for one agent invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Full prompt text passed as the final argument
    pub prompt: String,
    /// Model override forwarded with `-m`
    pub model: Option<String>,
    /// Stream output live (false buffers until exit)
    pub stream: bool,
    /// Echo every tool line instead of the condensed summary
    pub verbose_tools: bool,
    /// Inactivity timeout; `None` disables
    pub timeout: Option<Duration>,
    /// Extra environment for the child (config overrides)
    pub env: Vec<(String, String)>,
}

/// Launches the external agent and monitors its output.
#[derive(Debug, Clone)]
pub struct AgentRunner {
    command: String,
    project_dir: PathBuf,
}

impl AgentRunner {
    /// Create a runner for the given agent command and project directory.
    #[must_use]
    pub fn new(command: impl Into<String>, project_dir: impl AsRef<Path>) -> Self {
        Self {
            command: command.into(),
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// The agent command this runner launches.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Verify the agent binary is on PATH before the first iteration.
    pub fn ensure_available(&self) -> Result<()> {
        which::which(&self.command).map_err(|_| GrindError::AgentNotFound {
            command: self.command.clone(),
        })?;
        Ok(())
    }

    /// Run one agent invocation to completion.
    ///
    /// Returns the captured output and the exit code. The child is killed
    /// whenever the monitor fails (timeout or stream error) and on drop,
    /// so no invocation can leak a process.
    pub async fn run(&self, options: &RunOptions) -> Result<(StreamResult, i32)> {
        let mut command = Command::new(&self.command);
        command.arg("run");
        if let Some(model) = &options.model {
            command.args(["-m", model]);
        }
        command.arg(&options.prompt);
        command
            .current_dir(&self.project_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &options.env {
            command.env(key, value);
        }

        debug!(
            "Launching agent: {} run ({} char prompt)",
            self.command,
            options.prompt.len()
        );

        let mut child = command
            .spawn()
            .map_err(|e| GrindError::agent_launch(format!("failed to start {}: {e}", self.command)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GrindError::agent_launch("failed to open stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GrindError::agent_launch("failed to open stderr pipe"))?;

        let monitored = if options.stream {
            stream::monitor_streams(
                stdout,
                stderr,
                MonitorOptions {
                    compact_tools: !options.verbose_tools,
                    inactivity_timeout: options.timeout,
                    started: Instant::now(),
                },
            )
            .await
        } else {
            stream::buffer_streams(stdout, stderr).await
        };

        let result = match monitored {
            Ok(result) => result,
            Err(err) => {
                let _ = child.kill().await;
                return Err(err);
            }
        };

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);

        Ok((result, exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_available_rejects_missing_binary() {
        let temp = TempDir::new().unwrap();
        let runner = AgentRunner::new("definitely-not-a-real-agent-binary", temp.path());
        let err = runner.ensure_available().expect_err("binary is missing");
        assert!(matches!(err, GrindError::AgentNotFound { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_ensure_available_accepts_common_binary() {
        let temp = TempDir::new().unwrap();
        // `sh` exists on any unix test environment
        let runner = AgentRunner::new("sh", temp.path());
        assert!(runner.ensure_available().is_ok());
    }

    #[tokio::test]
    async fn test_run_missing_binary_is_launch_error() {
        let temp = TempDir::new().unwrap();
        let runner = AgentRunner::new("definitely-not-a-real-agent-binary", temp.path());
        let options = RunOptions {
            prompt: "hello".to_string(),
            model: None,
            stream: false,
            verbose_tools: false,
            timeout: None,
            env: Vec::new(),
        };
        let err = runner.run(&options).await.expect_err("spawn must fail");
        assert!(matches!(err, GrindError::AgentLaunch { .. }));
        assert!(err.is_fatal());
    }
}
