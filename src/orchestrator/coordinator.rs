//! The phase-orchestration coordinator.
//!
//! `AutoExecutionCoordinator` owns every unit's execution record, decides
//! which phase runs next and reports each decision on its event bus. It
//! never launches agents itself: an executor listens for
//! `execute-next-phase` / `execute-merge` and calls back with
//! `on_phase_agent_*` when the agent finishes.
//!
//! All operations are synchronous. Each one commits its mutation to the
//! store before publishing the events describing it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::options::{ExecutionOptions, ReviewFlag};
use super::state::{ExecutionRecord, ExecutionStatus, StateStore};
use crate::errors::CoordinatorError;
use crate::events::{
    EventBus, EventSubscriber, ExecutionEvent, FileChangeKind, PhaseContext, SubscriptionId,
};
use crate::phase::{CompletionRoute, PHASE_ORDER, Phase, next_permitted_phase};

/// Default stall window: 30 minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 1_800_000;

/// Default ceiling on simultaneously running units.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Maximum number of document-review rounds.
pub const MAX_REVIEW_ROUNDS: u32 = 7;

/// Outcome reported by an executor when a phase agent exits normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    Completed,
    Failed,
}

/// Liveness reported by an executor while an agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Running,
    Waiting,
    Completed,
    Failed,
    Interrupted,
}

impl AgentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }
}

/// Fixed limits for one coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub max_concurrent: usize,
    pub default_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

pub struct AutoExecutionCoordinator {
    pub(super) store: StateStore,
    bus: EventBus,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: CoordinatorConfig,
}

impl Default for AutoExecutionCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl AutoExecutionCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: StateStore::new(),
            bus: EventBus::new(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ── Caller operations ────────────────────────────────────────────

    /// Start a run for `unit_path`.
    ///
    /// Supersedes any finished record for the same key. Requests the first
    /// permitted phase, or completes immediately when none is permitted.
    pub fn start(
        &mut self,
        owner_path: &str,
        unit_path: &str,
        unit_id: &str,
        options: ExecutionOptions,
    ) -> Result<ExecutionRecord, CoordinatorError> {
        if self.store.is_running(unit_path) {
            return Err(CoordinatorError::AlreadyExecuting {
                unit_path: unit_path.to_string(),
            });
        }
        if self.store.running_count() >= self.config.max_concurrent {
            return Err(CoordinatorError::MaxConcurrentReached {
                limit: self.config.max_concurrent,
            });
        }

        let (already_done, first) = plan_first_phase(&options)?;

        let mut record = ExecutionRecord::new(owner_path, unit_path, unit_id, self.clock.now_ms());
        record.executed_phases = already_done;
        self.store.put(record, options);

        info!(
            unit_path,
            unit_id,
            first_phase = ?first,
            "execution started"
        );

        match first {
            Some(phase) => self.dispatch_phase(unit_path, phase),
            None => {
                self.emit_state_changed(unit_path);
                self.finalize(unit_path);
            }
        }

        Ok(self.snapshot(unit_path))
    }

    /// Pause a running unit. The executor is responsible for killing its agent.
    pub fn stop(&mut self, unit_path: &str) -> Result<(), CoordinatorError> {
        let now = self.clock.now_ms();
        let record = match self.store.get_mut(unit_path) {
            Some(r) if r.is_running() => r,
            _ => {
                return Err(CoordinatorError::NotExecuting {
                    unit_path: unit_path.to_string(),
                });
            }
        };
        record.status = ExecutionStatus::Paused;
        record.touch(now);

        info!(unit_path, "execution stopped");
        self.emit_state_changed(unit_path);
        Ok(())
    }

    /// Resume a unit from `phase`, discarding errors and any progress at or
    /// after that phase. Reuses the options the unit was started with.
    pub fn retry_from(
        &mut self,
        unit_path: &str,
        phase: Phase,
    ) -> Result<ExecutionRecord, CoordinatorError> {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            return Err(CoordinatorError::NotExecuting {
                unit_path: unit_path.to_string(),
            });
        };
        record.errors.clear();
        record.truncate_from(phase);
        record.status = ExecutionStatus::Running;
        record.current_phase = Some(phase);
        record.current_agent_id = None;
        record.current_review_round = None;
        record.start_time = now;
        record.touch(now);

        info!(unit_path, %phase, "retrying execution");
        self.emit_state_changed(unit_path);

        match phase {
            Phase::DocumentReview => self.continue_review_loop(unit_path, 1),
            Phase::Deploy => self.request_merge(unit_path),
            _ => self.request_phase(unit_path, phase),
        }

        Ok(self.snapshot(unit_path))
    }

    pub fn get_status(&self, unit_path: &str) -> Option<ExecutionRecord> {
        self.store.get(unit_path).cloned()
    }

    pub fn get_all_statuses(&self) -> HashMap<String, ExecutionRecord> {
        self.store.snapshot()
    }

    /// True only for `running`; a paused unit is not executing.
    pub fn is_executing(&self, unit_path: &str) -> bool {
        self.store.is_running(unit_path)
    }

    pub fn running_count(&self) -> usize {
        self.store.running_count()
    }

    pub fn get_current_review_round(&self, unit_path: &str) -> Option<u32> {
        self.store.get(unit_path).and_then(|r| r.current_review_round)
    }

    /// Pass-through notification of an external edit to one of the unit's files.
    pub fn notify_file_changed(&self, unit_path: &str, file_name: &str, change_kind: FileChangeKind) {
        self.emit(ExecutionEvent::FileChanged {
            unit_path: unit_path.to_string(),
            file_name: file_name.to_string(),
            change_kind,
        });
    }

    // ── Executor callbacks ───────────────────────────────────────────

    /// The executor confirms which phase it launched, and with which agent.
    pub fn set_current_phase(&mut self, unit_path: &str, phase: Phase, agent_id: Option<&str>) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            warn!(unit_path, %phase, "set_current_phase for unknown unit");
            return;
        };
        record.current_phase = Some(phase);
        record.current_agent_id = agent_id.map(str::to_string);
        record.touch(now);

        self.emit(ExecutionEvent::PhaseStarted {
            unit_path: unit_path.to_string(),
            phase,
            agent_id: agent_id.map(str::to_string),
        });
    }

    pub fn on_phase_agent_status_changed(&mut self, agent_id: &str, status: AgentStatus, unit_path: &str) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            debug!(unit_path, agent_id, "status change for unknown unit");
            return;
        };
        record.touch(now);

        if !status.is_active() || record.current_agent_id.as_deref() == Some(agent_id) {
            return;
        }
        let first_sighting = record.current_agent_id.is_none();
        record.current_agent_id = Some(agent_id.to_string());

        if first_sighting && let Some(phase) = record.current_phase {
            self.emit(ExecutionEvent::PhaseStarted {
                unit_path: unit_path.to_string(),
                phase,
                agent_id: Some(agent_id.to_string()),
            });
        }
    }

    pub fn on_phase_agent_completed(&mut self, agent_id: &str, unit_path: &str, outcome: AgentOutcome) {
        if !self.accepts_agent(unit_path, agent_id) {
            return;
        }
        match outcome {
            AgentOutcome::Failed => self.fail_phase(unit_path),
            AgentOutcome::Completed => self.complete_phase(unit_path),
        }
    }

    fn complete_phase(&mut self, unit_path: &str) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            return;
        };
        if record.status.is_terminal() {
            debug!(unit_path, status = %record.status, "ignoring completion for finished run");
            return;
        }
        let Some(phase) = record.current_phase else {
            warn!(unit_path, "agent completed with no current phase");
            return;
        };
        record.current_agent_id = None;
        record.touch(now);
        // Review is recorded as executed once its verdict is approved.
        if phase != Phase::DocumentReview {
            record.mark_phase_executed(phase);
        }
        let running = record.is_running();

        info!(unit_path, %phase, "phase completed");
        self.emit(ExecutionEvent::PhaseCompleted {
            unit_path: unit_path.to_string(),
            phase,
        });

        if !running {
            debug!(unit_path, %phase, "unit not running, not scheduling next phase");
            return;
        }
        self.route_after(unit_path, phase);
    }

    /// Consult the transition table for what follows a completed phase.
    fn route_after(&mut self, unit_path: &str, completed: Phase) {
        let Some(options) = self.store.options(unit_path).cloned() else {
            return;
        };
        match completed.completion_route() {
            CompletionRoute::Linear => self.advance(unit_path, completed),
            CompletionRoute::EnterReviewLoop => {
                if next_permitted_phase(Some(completed), &options.permissions)
                    == Some(Phase::DocumentReview)
                {
                    self.begin_review_loop(unit_path);
                } else {
                    self.advance(unit_path, completed);
                }
            }
            CompletionRoute::InspectionOrFinish => {
                if options.permissions.is_permitted(Phase::Inspection) {
                    self.request_phase(unit_path, Phase::Inspection);
                } else {
                    self.finalize(unit_path);
                }
            }
            CompletionRoute::AwaitReviewVerdict | CompletionRoute::AwaitInspectionVerdict => {
                debug!(unit_path, phase = %completed, "awaiting verdict");
            }
            CompletionRoute::Finish => self.finalize(unit_path),
        }
    }

    /// Move to the next permitted phase after `from`, or finish.
    pub(super) fn advance(&mut self, unit_path: &str, from: Phase) {
        let Some(options) = self.store.options(unit_path) else {
            return;
        };
        let next = next_permitted_phase(Some(from), &options.permissions);
        match next {
            Some(next) => self.dispatch_phase(unit_path, next),
            None => self.finalize(unit_path),
        }
    }

    /// Request `phase` the way its identity demands: review enters the loop,
    /// deploy goes through the merge gate, everything else is a plain request.
    fn dispatch_phase(&mut self, unit_path: &str, phase: Phase) {
        match phase {
            Phase::DocumentReview => self.begin_review_loop(unit_path),
            Phase::Deploy => {
                let merge_allowed = self
                    .store
                    .options(unit_path)
                    .is_some_and(ExecutionOptions::merge_allowed);
                if merge_allowed {
                    self.request_merge(unit_path);
                } else {
                    self.finalize(unit_path);
                }
            }
            _ => self.request_phase(unit_path, phase),
        }
    }

    fn begin_review_loop(&mut self, unit_path: &str) {
        let flag = self
            .store
            .options(unit_path)
            .map(|o| o.review_flag)
            .unwrap_or_default();
        match flag {
            ReviewFlag::Run => self.continue_review_loop(unit_path, 1),
            ReviewFlag::Pause => {
                let now = self.clock.now_ms();
                if let Some(record) = self.store.get_mut(unit_path) {
                    record.current_phase = Some(Phase::DocumentReview);
                    record.status = ExecutionStatus::Paused;
                    record.touch(now);
                }
                info!(unit_path, "document review paused before first round");
                self.emit_status_changed(unit_path);
            }
        }
    }

    /// Emit `execute-next-phase` for `phase`.
    pub(super) fn request_phase(&mut self, unit_path: &str, phase: Phase) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            return;
        };
        record.current_phase = Some(phase);
        record.current_agent_id = None;
        if phase != Phase::DocumentReview {
            record.current_review_round = None;
        }
        record.touch(now);
        let context = self.phase_context(unit_path);

        debug!(unit_path, %phase, "requesting phase");
        self.emit_state_changed(unit_path);
        self.emit(ExecutionEvent::ExecuteNextPhase {
            unit_path: unit_path.to_string(),
            phase,
            context,
        });
    }

    /// Emit `execute-merge`.
    pub(super) fn request_merge(&mut self, unit_path: &str) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            return;
        };
        record.current_phase = Some(Phase::Deploy);
        record.current_agent_id = None;
        record.touch(now);
        let context = self.phase_context(unit_path);

        info!(unit_path, "requesting merge");
        self.emit_state_changed(unit_path);
        self.emit(ExecutionEvent::ExecuteMerge {
            unit_path: unit_path.to_string(),
            context,
        });
    }

    /// Mark the run completed.
    pub(super) fn finalize(&mut self, unit_path: &str) {
        let now = self.clock.now_ms();
        let Some(record) = self.store.get_mut(unit_path) else {
            return;
        };
        record.status = ExecutionStatus::Completed;
        record.current_phase = None;
        record.current_agent_id = None;
        record.current_review_round = None;
        record.touch(now);

        info!(
            unit_path,
            executed = ?record.executed_phases,
            "execution completed"
        );
        self.emit_state_changed(unit_path);
        let record = self.snapshot(unit_path);
        self.emit(ExecutionEvent::ExecutionCompleted {
            unit_path: unit_path.to_string(),
            record,
        });
    }

    /// Move a unit to `paused` pending human attention.
    pub(super) fn pause_for_attention(&mut self, unit_path: &str) {
        let now = self.clock.now_ms();
        if let Some(record) = self.store.get_mut(unit_path) {
            record.status = ExecutionStatus::Paused;
            record.current_agent_id = None;
            record.touch(now);
        }
        self.emit_status_changed(unit_path);
    }

    /// Drop callbacks for unknown units or from an agent that is no longer
    /// the unit's current one.
    pub(super) fn accepts_agent(&self, unit_path: &str, agent_id: &str) -> bool {
        let Some(record) = self.store.get(unit_path) else {
            warn!(unit_path, agent_id, "agent callback for unknown unit");
            return false;
        };
        match record.current_agent_id.as_deref() {
            Some(current) if current != agent_id => {
                debug!(unit_path, agent_id, current, "ignoring stale agent callback");
                false
            }
            _ => true,
        }
    }

    // ── Event helpers ────────────────────────────────────────────────

    fn phase_context(&self, unit_path: &str) -> PhaseContext {
        let record = self.store.get(unit_path);
        let options = self.store.options(unit_path);
        PhaseContext {
            owner_path: record.map(|r| r.owner_path.clone()).unwrap_or_default(),
            unit_id: record.map(|r| r.unit_id.clone()).unwrap_or_default(),
            review_round: record
                .filter(|r| r.current_phase == Some(Phase::DocumentReview))
                .and_then(|r| r.current_review_round),
            validation: options.map(|o| o.validation).unwrap_or_default(),
        }
    }

    /// Clone of the committed record. Only called for keys just written.
    pub(super) fn snapshot(&self, unit_path: &str) -> ExecutionRecord {
        match self.store.get(unit_path) {
            Some(record) => record.clone(),
            None => panic!("no execution record for {unit_path} after mutation"),
        }
    }

    pub(super) fn emit(&self, event: ExecutionEvent) {
        self.bus.publish(&event);
    }

    pub(super) fn emit_state_changed(&self, unit_path: &str) {
        if let Some(record) = self.store.get(unit_path) {
            self.emit(ExecutionEvent::StateChanged {
                unit_path: unit_path.to_string(),
                record: record.clone(),
            });
        }
    }

    pub(super) fn emit_status_changed(&self, unit_path: &str) {
        if let Some(record) = self.store.get(unit_path) {
            self.emit(ExecutionEvent::StatusChanged {
                unit_path: unit_path.to_string(),
                record: record.clone(),
            });
        }
    }
}

/// Work out which document phases the approvals already cover and which
/// phase runs first.
fn plan_first_phase(
    options: &ExecutionOptions,
) -> Result<(Vec<Phase>, Option<Phase>), CoordinatorError> {
    let approved = |p: Phase| {
        p.is_document_phase() && options.approval(p).is_some_and(|a| a.approved)
    };

    let mut cursor = None;
    let first = loop {
        match next_permitted_phase(cursor, &options.permissions) {
            Some(p) if approved(p) => cursor = Some(p),
            other => break other,
        }
    };

    if let Some(first) = first {
        for p in PHASE_ORDER.iter().copied().filter(|p| p.is_document_phase() && *p < first) {
            if let Some(status) = options.approval(p)
                && status.generated
                && !status.approved
            {
                return Err(CoordinatorError::PreconditionFailed {
                    reason: format!("{} has been generated but not approved", p),
                });
            }
        }
    }

    let already_done = PHASE_ORDER
        .iter()
        .copied()
        .filter(|p| approved(*p) && first.is_none_or(|f| *p < f))
        .collect();

    Ok((already_done, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::orchestrator::clock::ManualClock;
    use crate::orchestrator::options::ApprovalStatus;
    use crate::phase::PhasePermissions;
    use std::collections::BTreeMap;

    const OWNER: &str = "/project";

    fn coordinator() -> (AutoExecutionCoordinator, EventLog, ManualClock) {
        coordinator_with_limit(DEFAULT_MAX_CONCURRENT)
    }

    fn coordinator_with_limit(limit: usize) -> (AutoExecutionCoordinator, EventLog, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let mut coord = AutoExecutionCoordinator::with_clock(
            CoordinatorConfig {
                max_concurrent: limit,
                default_timeout_ms: DEFAULT_TIMEOUT_MS,
            },
            Arc::new(clock.clone()),
        );
        let log = EventLog::new();
        coord.subscribe(Arc::new(log.clone()));
        (coord, log, clock)
    }

    fn unit(name: &str) -> String {
        format!("{}/.kiro/specs/{}", OWNER, name)
    }

    fn requested_phases(log: &EventLog) -> Vec<Phase> {
        log.events()
            .into_iter()
            .filter_map(|e| match e {
                ExecutionEvent::ExecuteNextPhase { phase, .. } => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn complete(coord: &mut AutoExecutionCoordinator, unit_path: &str) {
        coord.on_phase_agent_completed("agent", unit_path, AgentOutcome::Completed);
    }

    #[test]
    fn test_start_requests_first_permitted_phase() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        let perms = PhasePermissions::only(&[Phase::Requirements]);

        let record = coord
            .start(OWNER, &s, "f", ExecutionOptions::new(perms))
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Running);
        assert_eq!(record.current_phase, Some(Phase::Requirements));
        assert_eq!(requested_phases(&log), vec![Phase::Requirements]);
        assert_eq!(
            log.event_types(),
            vec!["state-changed", "execute-next-phase"]
        );
    }

    #[test]
    fn test_single_phase_run_completes() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        coord
            .start(
                OWNER,
                &s,
                "f",
                ExecutionOptions::new(PhasePermissions::only(&[Phase::Requirements])),
            )
            .unwrap();

        complete(&mut coord, &s);

        let record = coord.get_status(&s).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.executed_phases, vec![Phase::Requirements]);
        assert_eq!(log.event_types().last(), Some(&"execution-completed"));
    }

    #[test]
    fn test_start_with_nothing_permitted_completes_immediately() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        let record = coord
            .start(OWNER, &s, "f", ExecutionOptions::default())
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(requested_phases(&log).is_empty());
        assert!(log.event_types().contains(&"execution-completed"));
    }

    #[test]
    fn test_second_start_is_rejected_and_leaves_state() {
        let (mut coord, _, _) = coordinator();
        let s = unit("f");
        let opts = ExecutionOptions::new(PhasePermissions::all());
        coord.start(OWNER, &s, "f", opts.clone()).unwrap();
        let before = coord.get_status(&s);

        let err = coord.start(OWNER, &s, "f", opts).unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::AlreadyExecuting {
                unit_path: s.clone()
            }
        );
        assert_eq!(coord.get_status(&s), before);
    }

    #[test]
    fn test_concurrency_ceiling() {
        let (mut coord, _, _) = coordinator_with_limit(2);
        let opts = ExecutionOptions::new(PhasePermissions::all());
        coord.start(OWNER, &unit("a"), "a", opts.clone()).unwrap();
        coord.start(OWNER, &unit("b"), "b", opts.clone()).unwrap();

        let err = coord.start(OWNER, &unit("c"), "c", opts).unwrap_err();
        assert_eq!(err, CoordinatorError::MaxConcurrentReached { limit: 2 });
        assert!(coord.get_status(&unit("c")).is_none());
    }

    #[test]
    fn test_paused_units_do_not_count_toward_ceiling() {
        let (mut coord, _, _) = coordinator_with_limit(1);
        let opts = ExecutionOptions::new(PhasePermissions::all());
        coord.start(OWNER, &unit("a"), "a", opts.clone()).unwrap();
        coord.stop(&unit("a")).unwrap();
        assert!(coord.start(OWNER, &unit("b"), "b", opts).is_ok());
    }

    #[test]
    fn test_retry_resumes_past_ceiling() {
        let (mut coord, _, _) = coordinator_with_limit(1);
        let opts = ExecutionOptions::new(PhasePermissions::all());
        coord.start(OWNER, &unit("a"), "a", opts.clone()).unwrap();
        coord.stop(&unit("a")).unwrap();
        coord.start(OWNER, &unit("b"), "b", opts).unwrap();

        coord.retry_from(&unit("a"), Phase::Requirements).unwrap();
        assert_eq!(coord.running_count(), 2);
    }

    #[test]
    fn test_completion_after_finish_is_ignored() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        coord
            .start(
                OWNER,
                &s,
                "f",
                ExecutionOptions::new(PhasePermissions::only(&[Phase::Design])),
            )
            .unwrap();
        complete(&mut coord, &s);
        let before = coord.get_status(&s);
        let events = log.events().len();

        coord.on_phase_agent_completed("late", &s, AgentOutcome::Completed);

        assert_eq!(coord.get_status(&s), before);
        assert_eq!(log.events().len(), events);
    }

    #[test]
    fn test_restart_supersedes_finished_record() {
        let (mut coord, _, _) = coordinator();
        let s = unit("f");
        let opts = ExecutionOptions::new(PhasePermissions::only(&[Phase::Design]));
        coord.start(OWNER, &s, "f", opts.clone()).unwrap();
        complete(&mut coord, &s);
        assert_eq!(coord.get_status(&s).unwrap().status, ExecutionStatus::Completed);

        let record = coord.start(OWNER, &s, "f", opts).unwrap();
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.executed_phases.is_empty());
        assert_eq!(coord.get_all_statuses().len(), 1);
    }

    #[test]
    fn test_stop_pauses_and_blocks_advance() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(PhasePermissions::all()))
            .unwrap();
        coord.stop(&s).unwrap();
        assert!(!coord.is_executing(&s));
        assert_eq!(coord.get_status(&s).unwrap().status, ExecutionStatus::Paused);

        complete(&mut coord, &s);
        let record = coord.get_status(&s).unwrap();
        assert_eq!(record.executed_phases, vec![Phase::Requirements]);
        assert_eq!(record.status, ExecutionStatus::Paused);
        assert_eq!(requested_phases(&log), vec![Phase::Requirements]);
    }

    #[test]
    fn test_stop_not_executing() {
        let (mut coord, _, _) = coordinator();
        let err = coord.stop(&unit("missing")).unwrap_err();
        assert_eq!(err.code(), "NOT_EXECUTING");
    }

    #[test]
    fn test_linear_progression_is_monotonic() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        let perms = PhasePermissions::only(&[Phase::Requirements, Phase::Design, Phase::Tasks]);
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(perms))
            .unwrap();

        for _ in 0..3 {
            complete(&mut coord, &s);
        }

        let record = coord.get_status(&s).unwrap();
        assert_eq!(
            record.executed_phases,
            vec![Phase::Requirements, Phase::Design, Phase::Tasks]
        );
        assert!(record.executed_phases.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(
            requested_phases(&log),
            vec![Phase::Requirements, Phase::Design, Phase::Tasks]
        );
    }

    #[test]
    fn test_impl_without_inspection_finishes_even_if_deploy_permitted() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        let perms = PhasePermissions::only(&[Phase::Impl, Phase::Deploy]);
        coord
            .start(
                OWNER,
                &s,
                "f",
                ExecutionOptions::new(perms).with_auto_merge(true),
            )
            .unwrap();
        complete(&mut coord, &s);

        assert_eq!(coord.get_status(&s).unwrap().status, ExecutionStatus::Completed);
        assert!(!log.event_types().contains(&"execute-merge"));
    }

    #[test]
    fn test_impl_then_inspection() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        let perms = PhasePermissions::only(&[Phase::Impl, Phase::Inspection]);
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(perms))
            .unwrap();
        complete(&mut coord, &s);

        assert_eq!(requested_phases(&log), vec![Phase::Impl, Phase::Inspection]);
        assert!(coord.is_executing(&s));
    }

    #[test]
    fn test_retry_truncates_and_clears_errors() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(PhasePermissions::all()))
            .unwrap();
        complete(&mut coord, &s); // requirements
        complete(&mut coord, &s); // design
        coord.on_phase_agent_completed("agent", &s, AgentOutcome::Failed);
        assert_eq!(coord.get_status(&s).unwrap().status, ExecutionStatus::Error);

        log.clear();
        let record = coord.retry_from(&s, Phase::Design).unwrap();
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.errors.is_empty());
        assert_eq!(record.executed_phases, vec![Phase::Requirements]);
        assert_eq!(record.current_phase, Some(Phase::Design));
        assert_eq!(requested_phases(&log), vec![Phase::Design]);
        assert_eq!(log.event_types()[0], "state-changed");
    }

    #[test]
    fn test_retry_unknown_unit() {
        let (mut coord, _, _) = coordinator();
        let err = coord.retry_from(&unit("nope"), Phase::Impl).unwrap_err();
        assert!(matches!(err, CoordinatorError::NotExecuting { .. }));
    }

    #[test]
    fn test_read_accessors_do_not_mutate() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(PhasePermissions::all()))
            .unwrap();
        let events_before = log.events().len();
        let first = coord.get_all_statuses();
        for _ in 0..3 {
            assert_eq!(coord.get_all_statuses(), first);
            assert_eq!(coord.get_status(&s).as_ref(), first.get(&s));
        }
        assert!(coord.get_status(&unit("absent")).is_none());
        assert_eq!(log.events().len(), events_before);
    }

    #[test]
    fn test_same_owner_units_are_independent() {
        let (mut coord, _, _) = coordinator();
        let opts = ExecutionOptions::new(PhasePermissions::all());
        coord.start(OWNER, &unit("a"), "a", opts.clone()).unwrap();
        coord.start(OWNER, &unit("b"), "b", opts).unwrap();

        let all = coord.get_all_statuses();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&unit("a")].unit_id, "a");
        assert_eq!(all[&unit("b")].unit_id, "b");
        assert_eq!(all[&unit("a")].owner_path, all[&unit("b")].owner_path);
    }

    #[test]
    fn test_stale_agent_callback_is_ignored() {
        let (mut coord, _, _) = coordinator();
        let s = unit("f");
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(PhasePermissions::all()))
            .unwrap();
        coord.set_current_phase(&s, Phase::Requirements, Some("agent-2"));

        coord.on_phase_agent_completed("agent-1", &s, AgentOutcome::Completed);
        let record = coord.get_status(&s).unwrap();
        assert!(record.executed_phases.is_empty());
        assert_eq!(record.current_agent_id.as_deref(), Some("agent-2"));
    }

    #[test]
    fn test_status_change_records_agent_and_activity() {
        let (mut coord, log, clock) = coordinator();
        let s = unit("f");
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(PhasePermissions::all()))
            .unwrap();
        clock.advance(5_000);

        coord.on_phase_agent_status_changed("agent-7", AgentStatus::Running, &s);
        coord.on_phase_agent_status_changed("agent-7", AgentStatus::Running, &s);

        let record = coord.get_status(&s).unwrap();
        assert_eq!(record.current_agent_id.as_deref(), Some("agent-7"));
        assert_eq!(record.last_activity_time, 1_005_000);
        let started = log
            .event_types()
            .iter()
            .filter(|t| **t == "phase-started")
            .count();
        assert_eq!(started, 1);
    }

    #[test]
    fn test_inactive_status_only_touches() {
        let (mut coord, _, clock) = coordinator();
        let s = unit("f");
        coord
            .start(OWNER, &s, "f", ExecutionOptions::new(PhasePermissions::all()))
            .unwrap();
        clock.advance(10);
        coord.on_phase_agent_status_changed("agent-1", AgentStatus::Completed, &s);
        let record = coord.get_status(&s).unwrap();
        assert!(record.current_agent_id.is_none());
        assert_eq!(record.last_activity_time, 1_000_010);
    }

    #[test]
    fn test_file_changed_is_pass_through() {
        let (coord, log, _) = coordinator();
        coord.notify_file_changed(&unit("f"), "requirements.md", FileChangeKind::Change);
        assert_eq!(log.event_types(), vec!["file-changed"]);
        assert!(coord.get_status(&unit("f")).is_none());
    }

    #[test]
    fn test_approvals_skip_approved_documents() {
        let (mut coord, log, _) = coordinator();
        let s = unit("f");
        let mut approvals = BTreeMap::new();
        approvals.insert(Phase::Requirements, ApprovalStatus::approved());
        approvals.insert(Phase::Design, ApprovalStatus::approved());
        let opts = ExecutionOptions::new(PhasePermissions::all()).with_approvals(approvals);

        let record = coord.start(OWNER, &s, "f", opts).unwrap();
        assert_eq!(
            record.executed_phases,
            vec![Phase::Requirements, Phase::Design]
        );
        assert_eq!(requested_phases(&log), vec![Phase::Tasks]);
    }

    #[test]
    fn test_unapproved_document_blocks_later_start() {
        let (mut coord, _, _) = coordinator();
        let s = unit("f");
        let mut approvals = BTreeMap::new();
        approvals.insert(
            Phase::Requirements,
            ApprovalStatus {
                generated: true,
                approved: false,
            },
        );
        let opts = ExecutionOptions::new(PhasePermissions::only(&[Phase::Design]))
            .with_approvals(approvals);

        let err = coord.start(OWNER, &s, "f", opts).unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
        assert!(coord.get_status(&s).is_none());
    }

    #[test]
    fn test_unsubscribed_log_sees_nothing() {
        let (mut coord, _, _) = coordinator();
        let extra = EventLog::new();
        let id = coord.subscribe(Arc::new(extra.clone()));
        assert!(coord.unsubscribe(id));
        coord
            .start(OWNER, &unit("f"), "f", ExecutionOptions::default())
            .unwrap();
        assert!(extra.events().is_empty());
    }
}
