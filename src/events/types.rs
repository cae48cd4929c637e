//! Event payloads emitted by the coordinator.

use serde::{Deserialize, Serialize};

use crate::errors::WorkflowErrorKind;
use crate::orchestrator::options::ValidationOptions;
use crate::orchestrator::state::ExecutionRecord;
use crate::phase::Phase;

/// What an executor needs to launch an agent for a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseContext {
    pub owner_path: String,
    pub unit_id: String,
    /// Set only for document-review rounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_round: Option<u32>,
    #[serde(default)]
    pub validation: ValidationOptions,
}

/// A workflow failure as reported to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowError {
    #[serde(rename = "type")]
    pub kind: WorkflowErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub message: String,
}

/// Kind of external edit observed on a unit's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Add,
    Change,
    Unlink,
}

impl std::str::FromStr for FileChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "change" => Ok(Self::Change),
            "unlink" => Ok(Self::Unlink),
            _ => Err(format!("Invalid file change kind: {}", s)),
        }
    }
}

/// Everything the coordinator tells the outside world.
///
/// Each variant is emitted only after the mutation that caused it has been
/// committed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    StateChanged {
        unit_path: String,
        record: ExecutionRecord,
    },
    StatusChanged {
        unit_path: String,
        record: ExecutionRecord,
    },
    PhaseStarted {
        unit_path: String,
        phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    PhaseCompleted {
        unit_path: String,
        phase: Phase,
    },
    ExecuteNextPhase {
        unit_path: String,
        phase: Phase,
        context: PhaseContext,
    },
    ExecuteMerge {
        unit_path: String,
        context: PhaseContext,
    },
    ExecutionCompleted {
        unit_path: String,
        record: ExecutionRecord,
    },
    ExecutionError {
        unit_path: String,
        error: WorkflowError,
    },
    FileChanged {
        unit_path: String,
        file_name: String,
        change_kind: FileChangeKind,
    },
}

impl ExecutionEvent {
    pub fn unit_path(&self) -> &str {
        match self {
            Self::StateChanged { unit_path, .. }
            | Self::StatusChanged { unit_path, .. }
            | Self::PhaseStarted { unit_path, .. }
            | Self::PhaseCompleted { unit_path, .. }
            | Self::ExecuteNextPhase { unit_path, .. }
            | Self::ExecuteMerge { unit_path, .. }
            | Self::ExecutionCompleted { unit_path, .. }
            | Self::ExecutionError { unit_path, .. }
            | Self::FileChanged { unit_path, .. } => unit_path,
        }
    }

    /// Stable event name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state-changed",
            Self::StatusChanged { .. } => "status-changed",
            Self::PhaseStarted { .. } => "phase-started",
            Self::PhaseCompleted { .. } => "phase-completed",
            Self::ExecuteNextPhase { .. } => "execute-next-phase",
            Self::ExecuteMerge { .. } => "execute-merge",
            Self::ExecutionCompleted { .. } => "execution-completed",
            Self::ExecutionError { .. } => "execution-error",
            Self::FileChanged { .. } => "file-changed",
        }
    }
}
