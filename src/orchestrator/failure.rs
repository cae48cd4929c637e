//! Workflow failures, recoverable read errors and timeouts.

use tracing::{debug, warn};

use super::coordinator::AutoExecutionCoordinator;
use super::state::ExecutionStatus;
use crate::errors::WorkflowErrorKind;
use crate::events::{ExecutionEvent, WorkflowError};

impl AutoExecutionCoordinator {
    /// An agent process exited abnormally.
    pub fn on_phase_agent_crashed(&mut self, unit_path: &str, agent_id: &str, exit_code: i32) {
        if !self.accepts_agent(unit_path, agent_id) {
            return;
        }
        self.record_failure(unit_path, WorkflowErrorKind::AgentCrash, Some(exit_code));
    }

    /// The unit's documents could not be read. Pauses rather than errors.
    pub fn on_spec_read_error(&mut self, unit_path: &str, error: &str) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            warn!(unit_path, error, "read error for unknown unit");
            return;
        };
        record.status = ExecutionStatus::Paused;
        record.push_error(format!("Failed to read spec: {}", error));
        record.touch(now);

        warn!(unit_path, error, "spec read error, execution paused");
        self.emit_status_changed(unit_path);
    }

    /// Timeout window for a unit: its own override or the coordinator default.
    pub fn timeout_ms_for(&self, unit_path: &str) -> u64 {
        self.store
            .options(unit_path)
            .and_then(|o| o.timeout_ms)
            .unwrap_or(self.config.default_timeout_ms)
    }

    /// True when a running unit has been going for longer than its window.
    /// Absent and non-running units never time out.
    pub fn check_timeout(&self, unit_path: &str) -> bool {
        let Some(record) = self.store.get(unit_path) else {
            return false;
        };
        if !record.is_running() {
            return false;
        }
        let timeout_ms = i64::try_from(self.timeout_ms_for(unit_path)).unwrap_or(i64::MAX);
        record.elapsed_ms(self.clock.now_ms()) > timeout_ms
    }

    /// Every running unit whose window has elapsed, sorted by path.
    pub fn check_all_timeouts(&self) -> Vec<String> {
        self.store
            .running_unit_paths()
            .into_iter()
            .filter(|p| self.check_timeout(p))
            .collect()
    }

    pub fn on_timeout(&mut self, unit_path: &str) {
        self.record_failure(unit_path, WorkflowErrorKind::Timeout, None);
    }

    pub(super) fn fail_phase(&mut self, unit_path: &str) {
        self.record_failure(unit_path, WorkflowErrorKind::PhaseExecutionFailed, None);
    }

    fn record_failure(&mut self, unit_path: &str, kind: WorkflowErrorKind, exit_code: Option<i32>) {
        let now = self.clock.now_ms();
        let timeout_ms = self.timeout_ms_for(unit_path);
        let Some(record) = self.store.get_mut(unit_path) else {
            warn!(unit_path, %kind, "failure reported for unknown unit");
            return;
        };
        // A stopped or finished run keeps its status.
        if !record.is_running() {
            debug!(unit_path, %kind, status = %record.status, "ignoring failure for unit not running");
            return;
        }
        let phase = record.current_phase;
        let phase_label = phase.map(|p| p.as_str()).unwrap_or("unknown");
        let message = match kind {
            WorkflowErrorKind::PhaseExecutionFailed => {
                format!("Phase {} failed", phase_label)
            }
            WorkflowErrorKind::AgentCrash => format!(
                "Agent crashed during phase {} with exit code {}",
                phase_label,
                exit_code.unwrap_or(-1)
            ),
            WorkflowErrorKind::Timeout => format!(
                "Execution timed out after {} ms during phase {}",
                timeout_ms, phase_label
            ),
        };

        record.push_error(message.clone());
        record.status = ExecutionStatus::Error;
        record.current_agent_id = None;
        record.touch(now);

        warn!(unit_path, %kind, phase = phase_label, "{}", message);
        self.emit_state_changed(unit_path);
        self.emit(ExecutionEvent::ExecutionError {
            unit_path: unit_path.to_string(),
            error: WorkflowError {
                kind,
                phase,
                exit_code,
                message,
            },
        });
    }
}
