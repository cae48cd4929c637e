//! Typed error hierarchy for the specpilot orchestrator.
//!
//! Two families cover the coordinator boundary:
//! - `CoordinatorError`: caller misuse returned synchronously from operations
//! - `WorkflowErrorKind`: workflow failures recorded on a unit and broadcast
//!   through `execution-error` events
//!
//! `RunnerError` covers the agent-process driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned from coordinator operations.
///
/// These are expected control flow, never panics. Each variant carries a
/// stable `code()` so bridges can forward it without string matching.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorError {
    #[error("Unit {unit_path} is already executing")]
    AlreadyExecuting { unit_path: String },

    #[error("Unit {unit_path} is not executing")]
    NotExecuting { unit_path: String },

    #[error("Maximum concurrent executions reached ({limit})")]
    MaxConcurrentReached { limit: usize },

    #[error("Precondition failed: {reason}")]
    PreconditionFailed { reason: String },
}

impl CoordinatorError {
    /// Stable machine-readable discriminant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExecuting { .. } => "ALREADY_EXECUTING",
            Self::NotExecuting { .. } => "NOT_EXECUTING",
            Self::MaxConcurrentReached { .. } => "MAX_CONCURRENT_REACHED",
            Self::PreconditionFailed { .. } => "PRECONDITION_FAILED",
        }
    }
}

/// Kind of workflow failure that moved a unit into the `error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowErrorKind {
    PhaseExecutionFailed,
    AgentCrash,
    Timeout,
}

impl WorkflowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhaseExecutionFailed => "PHASE_EXECUTION_FAILED",
            Self::AgentCrash => "AGENT_CRASH",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for WorkflowErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from spawning and supervising an agent process.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn agent process `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent process has no stdout handle")]
    MissingStdout,

    #[error("Failed to read agent output: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to wait for agent process: {0}")]
    WaitFailed(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_error_codes_are_stable() {
        let err = CoordinatorError::AlreadyExecuting {
            unit_path: "/p/.kiro/specs/a".into(),
        };
        assert_eq!(err.code(), "ALREADY_EXECUTING");
        assert_eq!(
            CoordinatorError::MaxConcurrentReached { limit: 3 }.code(),
            "MAX_CONCURRENT_REACHED"
        );
        assert_eq!(
            CoordinatorError::NotExecuting {
                unit_path: "x".into()
            }
            .code(),
            "NOT_EXECUTING"
        );
        assert_eq!(
            CoordinatorError::PreconditionFailed { reason: "r".into() }.code(),
            "PRECONDITION_FAILED"
        );
    }

    #[test]
    fn max_concurrent_carries_limit() {
        let err = CoordinatorError::MaxConcurrentReached { limit: 5 };
        match &err {
            CoordinatorError::MaxConcurrentReached { limit } => assert_eq!(*limit, 5),
            _ => panic!("Expected MaxConcurrentReached"),
        }
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn coordinator_error_serializes_with_type_tag() {
        let err = CoordinatorError::MaxConcurrentReached { limit: 2 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "MAX_CONCURRENT_REACHED");
        assert_eq!(json["limit"], 2);
    }

    #[test]
    fn workflow_kind_serializes_to_discriminant() {
        let json = serde_json::to_string(&WorkflowErrorKind::AgentCrash).unwrap();
        assert_eq!(json, "\"AGENT_CRASH\"");
        assert_eq!(WorkflowErrorKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(
            WorkflowErrorKind::PhaseExecutionFailed.as_str(),
            "PHASE_EXECUTION_FAILED"
        );
    }

    #[test]
    fn runner_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        let err = RunnerError::SpawnFailed {
            command: "claude".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_std_error(&err);
        assert!(err.to_string().contains("claude"));
    }
}
