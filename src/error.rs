//! Error types for a3s-recall

use thiserror::Error;

/// Errors that can occur while intercepting and shipping traffic
#[derive(Debug, Error)]
pub enum RecallError {
    /// Configuration error (missing agent command, missing endpoint, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The agent process could not be started
    #[error("Failed to spawn agent '{program}': {reason}")]
    Spawn {
        program: String,
        reason: String,
    },

    /// The agent process exited abnormally
    #[error("Agent exited abnormally: {status}")]
    AgentExit {
        status: String,
        /// Exit code, `None` when the agent was terminated by a signal
        code: Option<i32>,
    },

    /// I/O failure outside the per-line read path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A scrub rule failed to compile
    #[error("Invalid scrub pattern '{name}': {reason}")]
    Pattern {
        name: String,
        reason: String,
    },

    /// Delivery to the ingest endpoint failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The source task panicked or was aborted
    #[error("Source task failed: {0}")]
    Source(String),
}

impl RecallError {
    /// Process exit code for this error
    ///
    /// Agent exits propagate the agent's own non-zero code; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AgentExit {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Result type alias for recall operations
pub type Result<T> = std::result::Result<T, RecallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_propagates_agent_code() {
        let err = RecallError::AgentExit {
            status: "exit status: 3".to_string(),
            code: Some(3),
        };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_signal_terminated_agent() {
        let err = RecallError::AgentExit {
            status: "signal: 9".to_string(),
            code: None,
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        assert_eq!(RecallError::Config("no agent".into()).exit_code(), 1);
    }

    #[test]
    fn test_error_display() {
        let err = RecallError::Spawn {
            program: "claude".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to spawn agent 'claude': No such file or directory"
        );
    }
}
