//! Executor side of the coordinator: turns `execute-next-phase` and
//! `execute-merge` requests into agent processes and reports their results
//! back.
//!
//! The coordinator is shared behind an async mutex. Its event bus feeds a
//! `ChannelSubscriber`, whose receiver the `Driver` drains; subscribers never
//! call back into the coordinator directly.

pub mod process;
pub mod signals;

pub use process::{AgentInvocation, AgentRun, AgentRunner, AgentRunnerConfig, PhaseAgent};
pub use signals::{AgentVerdicts, parse_verdicts};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::RunnerError;
use crate::events::{ExecutionEvent, PhaseContext};
use crate::orchestrator::{
    AgentOutcome, AgentStatus, AutoExecutionCoordinator, ExecutionRecord, InspectionResult,
};
use crate::phase::Phase;

pub type SharedCoordinator = Arc<Mutex<AutoExecutionCoordinator>>;

/// Runs agents for requested phases until every watched unit settles.
pub struct Driver {
    coordinator: SharedCoordinator,
    agent: Arc<dyn PhaseAgent>,
    events: mpsc::UnboundedReceiver<ExecutionEvent>,
    timeout_check_interval: Duration,
    agents: HashMap<String, JoinHandle<()>>,
}

impl Driver {
    pub fn new(
        coordinator: SharedCoordinator,
        agent: Arc<dyn PhaseAgent>,
        events: mpsc::UnboundedReceiver<ExecutionEvent>,
        timeout_check_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            agent,
            events,
            timeout_check_interval,
            agents: HashMap::new(),
        }
    }

    /// Process events until none of `units` is running any more, then return
    /// their final records.
    ///
    /// A unit settles when it completes, errors or pauses.
    pub async fn drive(&mut self, units: &[String]) -> HashMap<String, ExecutionRecord> {
        let mut pending: HashSet<String> = units.iter().cloned().collect();

        let mut ticker = tokio::time::interval(self.timeout_check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            // Events already queued (such as the first phase request) must be
            // drained before deciding a unit has settled.
            while let Ok(event) = self.events.try_recv() {
                self.handle_event(event, &mut pending);
            }
            {
                let coordinator = self.coordinator.lock().await;
                pending.retain(|u| coordinator.is_executing(u));
            }
            if pending.is_empty() {
                break;
            }

            tokio::select! {
                maybe = self.events.recv() => {
                    let Some(event) = maybe else {
                        warn!("event channel closed while units were still running");
                        break;
                    };
                    self.handle_event(event, &mut pending);
                }
                _ = ticker.tick() => self.check_timeouts().await,
            }
        }

        for handle in self.agents.drain().map(|(_, h)| h) {
            handle.abort();
        }

        let coordinator = self.coordinator.lock().await;
        units
            .iter()
            .filter_map(|u| coordinator.get_status(u).map(|r| (u.clone(), r)))
            .collect()
    }

    fn handle_event(&mut self, event: ExecutionEvent, pending: &mut HashSet<String>) {
        match event {
            ExecutionEvent::ExecuteNextPhase {
                unit_path,
                phase,
                context,
            } => self.spawn_agent(invocation(unit_path, phase, context)),
            ExecutionEvent::ExecuteMerge { unit_path, context } => {
                self.spawn_agent(invocation(unit_path, Phase::Deploy, context))
            }
            ExecutionEvent::StateChanged { unit_path, record }
            | ExecutionEvent::StatusChanged { unit_path, record }
                if !record.is_running() =>
            {
                self.settle(&unit_path, pending);
            }
            ExecutionEvent::ExecutionCompleted { unit_path, .. } => {
                self.settle(&unit_path, pending);
            }
            ExecutionEvent::ExecutionError { unit_path, error } => {
                warn!(unit_path = %unit_path, kind = %error.kind, "{}", error.message);
                self.settle(&unit_path, pending);
            }
            other => debug!(
                event_type = other.event_type(),
                unit_path = other.unit_path(),
                "event"
            ),
        }
    }

    /// Stop tracking a unit and kill any agent still working for it.
    fn settle(&mut self, unit_path: &str, pending: &mut HashSet<String>) {
        pending.remove(unit_path);
        if let Some(handle) = self.agents.remove(unit_path)
            && !handle.is_finished()
        {
            debug!(unit_path, "aborting agent for settled unit");
            handle.abort();
        }
    }

    fn spawn_agent(&mut self, invocation: AgentInvocation) {
        let coordinator = Arc::clone(&self.coordinator);
        let agent = Arc::clone(&self.agent);
        let unit_path = invocation.unit_path.clone();
        let handle = tokio::spawn(run_phase_agent(coordinator, agent, invocation));
        // The previous agent for this unit is the one that requested this
        // phase and has already reported.
        self.agents.insert(unit_path, handle);
    }

    async fn check_timeouts(&mut self) {
        let mut coordinator = self.coordinator.lock().await;
        for unit_path in coordinator.check_all_timeouts() {
            coordinator.on_timeout(&unit_path);
            if let Some(handle) = self.agents.remove(&unit_path) {
                handle.abort();
            }
        }
    }
}

fn invocation(unit_path: String, phase: Phase, context: PhaseContext) -> AgentInvocation {
    AgentInvocation {
        owner_path: context.owner_path,
        unit_path,
        unit_id: context.unit_id,
        phase,
        review_round: context.review_round,
    }
}

async fn run_phase_agent(
    coordinator: SharedCoordinator,
    agent: Arc<dyn PhaseAgent>,
    invocation: AgentInvocation,
) {
    let agent_id = format!("agent-{}", Uuid::new_v4());
    {
        let mut coordinator = coordinator.lock().await;
        if !coordinator.is_executing(&invocation.unit_path) {
            debug!(unit_path = %invocation.unit_path, "unit no longer running, not spawning agent");
            return;
        }
        coordinator.on_phase_agent_status_changed(
            &agent_id,
            AgentStatus::Running,
            &invocation.unit_path,
        );
    }

    info!(
        unit_path = %invocation.unit_path,
        phase = %invocation.phase,
        agent_id = %agent_id,
        "running agent"
    );
    let result = agent.run(&invocation).await;

    let mut coordinator = coordinator.lock().await;
    report_outcome(&mut coordinator, &agent_id, &invocation, result);
}

/// Translate a finished agent into coordinator callbacks.
///
/// Exit 0 completes the phase; review and inspection phases then deliver the
/// verdict parsed from output. A missing review verdict counts as changes
/// requested and a missing inspection verdict as failed. Non-zero exit is a
/// crash; failure to launch fails the phase.
pub fn report_outcome(
    coordinator: &mut AutoExecutionCoordinator,
    agent_id: &str,
    invocation: &AgentInvocation,
    result: Result<AgentRun, RunnerError>,
) {
    let unit_path = invocation.unit_path.as_str();
    let is_current = coordinator
        .get_status(unit_path)
        .is_some_and(|r| r.current_agent_id.as_deref() == Some(agent_id));
    if !is_current {
        debug!(unit_path, agent_id, "dropping result from superseded agent");
        return;
    }

    let run = match result {
        Ok(run) => run,
        Err(err) => {
            warn!(unit_path, agent_id, error = %err, "agent could not be run");
            coordinator.on_phase_agent_completed(agent_id, unit_path, AgentOutcome::Failed);
            return;
        }
    };

    if !run.succeeded() {
        coordinator.on_phase_agent_crashed(unit_path, agent_id, run.exit_code);
        return;
    }

    coordinator.on_phase_agent_completed(agent_id, unit_path, AgentOutcome::Completed);
    match invocation.phase {
        Phase::DocumentReview => {
            if run.verdicts.review.is_none() {
                warn!(unit_path, "review agent printed no verdict");
            }
            coordinator.on_document_review_completed(unit_path, run.verdicts.review == Some(true));
        }
        Phase::Inspection => {
            let result = run.verdicts.inspection.unwrap_or_else(|| {
                warn!(unit_path, "inspection agent printed no verdict");
                InspectionResult::Failed
            });
            coordinator.on_inspection_completed(unit_path, result);
        }
        _ => {}
    }
}
