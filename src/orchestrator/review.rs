//! Document-review loop and the inspection → merge gate.

use tracing::{debug, info, warn};

use super::coordinator::{AutoExecutionCoordinator, MAX_REVIEW_ROUNDS};
use super::state::ExecutionStatus;
use crate::errors::WorkflowErrorKind;
use crate::events::{ExecutionEvent, WorkflowError};
use crate::phase::Phase;

/// Verdict of an inspection agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectionResult {
    Passed,
    Failed,
}

impl AutoExecutionCoordinator {
    /// Request review round `round`, or close the loop when `round` is past
    /// the cap.
    ///
    /// Only a running unit, or one paused inside the review loop, can take a
    /// round. A resumed unit is not checked against the concurrency ceiling.
    pub fn continue_review_loop(&mut self, unit_path: &str, round: u32) {
        let Some(record) = self.store.get(unit_path) else {
            warn!(unit_path, round, "review round for unknown unit");
            return;
        };
        let in_loop = record.is_running()
            || (record.status == ExecutionStatus::Paused
                && record.current_phase == Some(Phase::DocumentReview));
        if !in_loop {
            warn!(
                unit_path,
                round,
                status = %record.status,
                "review round for unit outside the review loop"
            );
            return;
        }
        if round > MAX_REVIEW_ROUNDS {
            info!(unit_path, round, "review round cap exceeded");
            self.finish_review(unit_path, false, true);
            return;
        }
        let Some(record) = self.store.get_mut(unit_path) else {
            return;
        };
        record.current_review_round = Some(round);
        // A human continuing a paused loop resumes the run.
        if record.status == ExecutionStatus::Paused {
            record.status = ExecutionStatus::Running;
        }

        info!(unit_path, round, "starting document review round");
        self.request_phase(unit_path, Phase::DocumentReview);
    }

    pub fn on_document_review_completed(&mut self, unit_path: &str, approved: bool) {
        let Some(record) = self.store.get(unit_path) else {
            warn!(unit_path, "review verdict for unknown unit");
            return;
        };
        let max_reached = record.current_review_round.unwrap_or(0) >= MAX_REVIEW_ROUNDS;
        self.finish_review(unit_path, approved, max_reached);
    }

    fn finish_review(&mut self, unit_path: &str, approved: bool, max_reached: bool) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            warn!(unit_path, "review finished for unknown unit");
            return;
        };
        record.touch(now);

        if approved {
            record.mark_phase_executed(Phase::DocumentReview);
            record.current_review_round = None;
            let running = record.is_running();
            info!(unit_path, "document review approved");
            if running {
                self.advance(unit_path, Phase::DocumentReview);
            }
            return;
        }

        if !max_reached {
            info!(
                unit_path,
                round = ?record.current_review_round,
                "document review not approved, awaiting decision"
            );
            self.pause_for_attention(unit_path);
            return;
        }

        let impl_permitted = self
            .store
            .options(unit_path)
            .is_some_and(|o| o.permissions.is_permitted(Phase::Impl));
        if impl_permitted {
            info!(unit_path, "max review rounds reached, implementation still blocked");
            self.pause_for_attention(unit_path);
        } else {
            info!(unit_path, "max review rounds reached, nothing further to run");
            self.finalize(unit_path);
        }
    }

    /// Act on an inspection verdict.
    pub fn on_inspection_completed(&mut self, unit_path: &str, result: InspectionResult) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            warn!(unit_path, "inspection verdict for unknown unit");
            return;
        };
        if record.status.is_terminal() {
            debug!(unit_path, status = %record.status, "ignoring inspection verdict for finished run");
            return;
        }
        record.touch(now);

        match result {
            InspectionResult::Failed if !record.is_running() => {
                debug!(unit_path, "inspection failed for stopped unit, keeping it paused");
            }
            InspectionResult::Failed => {
                let message = "Inspection failed".to_string();
                record.push_error(message.clone());
                record.status = ExecutionStatus::Error;
                record.current_agent_id = None;

                warn!(unit_path, "inspection failed");
                self.emit_state_changed(unit_path);
                self.emit(ExecutionEvent::ExecutionError {
                    unit_path: unit_path.to_string(),
                    error: WorkflowError {
                        kind: WorkflowErrorKind::PhaseExecutionFailed,
                        phase: Some(Phase::Inspection),
                        exit_code: None,
                        message,
                    },
                });
            }
            InspectionResult::Passed => {
                record.mark_phase_executed(Phase::Inspection);
                if !record.is_running() {
                    return;
                }
                let merge_allowed = self
                    .store
                    .options(unit_path)
                    .is_some_and(|o| o.merge_allowed());
                info!(unit_path, merge_allowed, "inspection passed");
                if merge_allowed {
                    self.request_merge(unit_path);
                } else {
                    self.finalize(unit_path);
                }
            }
        }
    }
}
