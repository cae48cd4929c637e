use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::options::ExecutionOptions;
use crate::phase::Phase;

/// Lifecycle status of one unit's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Completed or errored; only a new `start` or `retry_from` moves on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution state of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Owning project or workspace; may differ from where the unit is stored.
    pub owner_path: String,
    pub unit_path: String,
    pub unit_id: String,
    pub status: ExecutionStatus,
    pub current_phase: Option<Phase>,
    /// Completed phases in completion order, each at most once.
    pub executed_phases: Vec<Phase>,
    pub errors: Vec<String>,
    pub start_time: i64,
    pub last_activity_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_review_round: Option<u32>,
}

impl ExecutionRecord {
    pub fn new(owner_path: &str, unit_path: &str, unit_id: &str, now_ms: i64) -> Self {
        Self {
            owner_path: owner_path.to_string(),
            unit_path: unit_path.to_string(),
            unit_id: unit_id.to_string(),
            status: ExecutionStatus::Running,
            current_phase: None,
            executed_phases: Vec::new(),
            errors: Vec::new(),
            start_time: now_ms,
            last_activity_time: now_ms,
            current_agent_id: None,
            current_review_round: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.last_activity_time = now_ms;
    }

    /// Append `phase` to the executed list unless it is already there.
    pub fn mark_phase_executed(&mut self, phase: Phase) {
        if !self.executed_phases.contains(&phase) {
            self.executed_phases.push(phase);
        }
    }

    /// Drop every executed phase at or after `phase`.
    pub fn truncate_from(&mut self, phase: Phase) {
        self.executed_phases.retain(|p| *p < phase);
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.start_time
    }
}

struct StoreEntry {
    record: ExecutionRecord,
    options: ExecutionOptions,
}

/// Keyed store of execution records and the options each run started with.
///
/// Records are superseded by the next start for the same key, never removed.
#[derive(Default)]
pub struct StateStore {
    entries: HashMap<String, StoreEntry>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, unit_path: &str) -> Option<&ExecutionRecord> {
        self.entries.get(unit_path).map(|e| &e.record)
    }

    pub fn get_mut(&mut self, unit_path: &str) -> Option<&mut ExecutionRecord> {
        self.entries.get_mut(unit_path).map(|e| &mut e.record)
    }

    pub fn options(&self, unit_path: &str) -> Option<&ExecutionOptions> {
        self.entries.get(unit_path).map(|e| &e.options)
    }

    /// Insert or supersede the record for `record.unit_path`.
    pub fn put(&mut self, record: ExecutionRecord, options: ExecutionOptions) {
        self.entries
            .insert(record.unit_path.clone(), StoreEntry { record, options });
    }

    pub fn is_running(&self, unit_path: &str) -> bool {
        self.get(unit_path).is_some_and(ExecutionRecord::is_running)
    }

    pub fn running_count(&self) -> usize {
        self.entries.values().filter(|e| e.record.is_running()).count()
    }

    pub fn running_unit_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.record.is_running())
            .map(|e| e.record.unit_path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Snapshot of every record keyed by unit path.
    pub fn snapshot(&self) -> HashMap<String, ExecutionRecord> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.record.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
