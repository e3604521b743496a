//! Error types for CodeRelay
//!
//! Operation-level errors are returned to the direct caller. Errors raised
//! inside a task's background reader never surface here; they end up as a
//! failed task delivered through the completion callback.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// CodeRelay error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Task operations
    // ========================================================================
    #[error("Task {0} already exists")]
    DuplicateTask(String),

    #[error("Task {0} not found")]
    TaskNotFound(String),

    #[error("Task {task_id} is not waiting for an answer (status: {state})")]
    InvalidState { task_id: String, state: String },

    #[error("Task {0} process has exited")]
    ProcessExited(String),

    // ========================================================================
    // Subprocess / protocol
    // ========================================================================
    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Misc
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors a collaborator should report to the user as-is
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTask(_)
                | Error::TaskNotFound(_)
                | Error::InvalidState { .. }
                | Error::ProcessExited(_)
                | Error::Spawn { .. }
        )
    }

    /// Stream errors that drop a single line instead of aborting the reader
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ProtocolDecode(_))
    }

    pub fn invalid_state(task_id: impl Into<String>, state: impl Into<String>) -> Self {
        Error::InvalidState {
            task_id: task_id.into(),
            state: state.into(),
        }
    }

    pub fn spawn(command: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Spawn {
            command: command.into(),
            message: message.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_operation_errors() {
        assert_eq!(
            Error::DuplicateTask("dup-1".into()).to_string(),
            "Task dup-1 already exists"
        );
        assert_eq!(
            Error::TaskNotFound("nope".into()).to_string(),
            "Task nope not found"
        );
        assert_eq!(
            Error::invalid_state("t-2", "running").to_string(),
            "Task t-2 is not waiting for an answer (status: running)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(Error::TaskNotFound("x".into()).is_user_facing());
        assert!(!Error::ProtocolDecode("bad".into()).is_user_facing());
        assert!(Error::ProtocolDecode("bad".into()).is_recoverable());
        assert!(!Error::Internal("boom".into()).is_recoverable());
    }
}
