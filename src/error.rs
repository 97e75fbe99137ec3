//! Custom error types for Grind.
//!
//! This module provides structured error types that let the loop tell
//! apart expected per-iteration hiccups from conditions that must stop
//! the whole run.

use thiserror::Error;

/// Main error type for Grind operations
#[derive(Error, Debug)]
pub enum GrindError {
    // =========================================================================
    // Loop Lifecycle Errors
    // =========================================================================
    /// A loop is already active in this project directory
    #[error("a loop is already active (iteration {iteration})\nStarted at: {started_at}\nTo cancel it, press Ctrl+C in its terminal or delete {state_file}")]
    AlreadyActive {
        iteration: u32,
        started_at: String,
        state_file: String,
    },

    /// Loop execution failed
    #[error("Loop execution error: {message}")]
    Loop { message: String },

    /// State persistence failed
    #[error("State error: {message}")]
    State { message: String },

    // =========================================================================
    // Agent Process Errors
    // =========================================================================
    /// Agent binary not found on PATH
    #[error("Agent command not found: {command}. Install it or pass --agent")]
    AgentNotFound { command: String },

    /// Failed to launch the agent or wire its pipes
    #[error("Failed to run agent: {message}")]
    AgentLaunch { message: String },

    /// A stream worker hit a read error mid-run
    #[error("Agent output stream error: {message}")]
    Stream { message: String },

    /// No output on either stream for longer than the configured timeout
    #[error("timeout: no agent activity for {idle_ms} ms")]
    Inactivity { idle_ms: u64 },

    /// The agent loaded an unusable placeholder integration
    #[error("placeholder integration detected in agent output")]
    PlaceholderIntegration,

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Task list operation failed
    #[error("Task list error: {message}")]
    Tasks { message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GrindError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a loop error
    pub fn loop_error(message: impl Into<String>) -> Self {
        Self::Loop {
            message: message.into(),
        }
    }

    /// Create a state persistence error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create an agent launch error
    pub fn agent_launch(message: impl Into<String>) -> Self {
        Self::AgentLaunch {
            message: message.into(),
        }
    }

    /// Create a stream error
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a tasks error
    pub fn tasks(message: impl Into<String>) -> Self {
        Self::Tasks {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error must stop the whole loop.
    ///
    /// Fatal errors are launch/pipe failures, stream read errors, and a
    /// placeholder agent integration. Everything else is recorded against
    /// the current iteration and the loop carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound { .. }
                | Self::AgentLaunch { .. }
                | Self::Stream { .. }
                | Self::PlaceholderIntegration
                | Self::AlreadyActive { .. }
        )
    }

    /// Check if this error is an inactivity timeout.
    ///
    /// Timeouts are iteration-fatal but never loop-fatal: the iteration is
    /// recorded as degraded and the loop proceeds.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Inactivity { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyActive { .. } => 2,
            Self::AgentNotFound { .. } => 3,
            Self::PlaceholderIntegration => 4,
            _ => 1,
        }
    }
}

/// Type alias for Grind results
pub type Result<T> = std::result::Result<T, GrindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GrindError::AlreadyActive {
            iteration: 4,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            state_file: ".grind/loop.state.json".to_string(),
        };
        assert!(err.to_string().contains("iteration 4"));
        assert!(err.to_string().contains(".grind/loop.state.json"));
    }

    #[test]
    fn test_inactivity_display() {
        let err = GrindError::Inactivity { idle_ms: 3_600_000 };
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().contains("3600000"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(GrindError::agent_launch("spawn failed").is_fatal());
        assert!(GrindError::stream("broken pipe").is_fatal());
        assert!(GrindError::PlaceholderIntegration.is_fatal());
        assert!(!GrindError::loop_error("test").is_fatal());
        assert!(!GrindError::Inactivity { idle_ms: 1000 }.is_fatal());
    }

    #[test]
    fn test_is_timeout() {
        assert!(GrindError::Inactivity { idle_ms: 1 }.is_timeout());
        assert!(!GrindError::stream("eof").is_timeout());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            GrindError::AlreadyActive {
                iteration: 1,
                started_at: String::new(),
                state_file: String::new(),
            }
            .exit_code(),
            2
        );
        assert_eq!(
            GrindError::AgentNotFound {
                command: "opencode".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(GrindError::loop_error("test").exit_code(), 1);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: GrindError = io_err.into();
        assert!(matches!(err, GrindError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
