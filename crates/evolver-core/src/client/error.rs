//! Error types for agent queries.

use std::time::Duration;

use thiserror::Error;

/// A request rejected before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("objective must be at least {min} characters, got {actual}")]
    ObjectiveTooShort { min: usize, actual: usize },

    #[error("max_iterations must be between {min} and {max}, got {actual}")]
    IterationsOutOfRange { min: u32, max: u32, actual: u32 },

    #[error("target path must not be empty")]
    EmptyTargetPath,
}

/// Errors produced while running the agent process.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The binary could not be started at all.
    #[error("failed to spawn agent binary '{binary}' -- is it installed and on PATH?")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The deadline passed; the process has been killed.
    #[error("agent query timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    /// The process exited unsuccessfully.
    #[error("agent exited with {}: {stderr}", exit_label(.code))]
    Execution { code: Option<i32>, stderr: String },

    #[error("agent i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Output that does not follow the wire contract. The client degrades
    /// these to best-effort text instead of returning them.
    #[error("unexpected agent output: {0}")]
    Protocol(String),
}

impl AgentError {
    /// Whether this failure was a deadline expiry rather than a crash.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_distinguishable() {
        let timeout = AgentError::Timeout {
            after: Duration::from_secs(300),
        };
        let exec = AgentError::Execution {
            code: Some(1),
            stderr: "boom".into(),
        };
        assert!(timeout.is_timeout());
        assert!(!exec.is_timeout());
        assert_eq!(timeout.to_string(), "agent query timed out after 300s");
    }

    #[test]
    fn execution_error_carries_stderr() {
        let err = AgentError::Execution {
            code: Some(2),
            stderr: "model overloaded".into(),
        };
        assert_eq!(err.to_string(), "agent exited with exit code 2: model overloaded");

        let killed = AgentError::Execution {
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("a signal"));
    }

    #[test]
    fn validation_converts_into_agent_error() {
        let err: AgentError = ValidationError::EmptyPrompt.into();
        assert!(matches!(err, AgentError::Validation(ValidationError::EmptyPrompt)));
    }
}
