//! Drive one unit through its permitted phases: `specpilot run`.

use anyhow::{Context, Result};
use console::style;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use specpilot::audit::AuditLogger;
use specpilot::config::PilotConfig;
use specpilot::events::{ChannelSubscriber, EventSubscriber, ExecutionEvent};
use specpilot::orchestrator::{
    ApprovalStatus, AutoExecutionCoordinator, ExecutionOptions, ExecutionRecord, ExecutionStatus,
    ReviewFlag,
};
use specpilot::phase::{Phase, PhasePermissions, parse_phase_list};
use specpilot::runner::{AgentRunner, AgentRunnerConfig, Driver};

/// Arguments of `specpilot run`.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub unit_path: PathBuf,
    pub id: Option<String>,
    pub phases: Option<String>,
    pub approved: Option<String>,
    pub review: Option<ReviewFlag>,
    pub auto_merge: bool,
    pub timeout_ms: Option<u64>,
}

/// Prints phase progress as events arrive.
struct ConsoleReporter;

impl EventSubscriber for ConsoleReporter {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::PhaseStarted { phase, .. } => {
                println!("  {} {}", style("▶").cyan(), style(phase).yellow());
            }
            ExecutionEvent::PhaseCompleted { phase, .. } => {
                println!("  {} {}", style("✓").green(), phase);
            }
            ExecutionEvent::ExecuteNextPhase {
                phase: Phase::DocumentReview,
                context,
                ..
            } => {
                if let Some(round) = context.review_round {
                    println!("  {} review round {}", style("↻").dim(), round);
                }
            }
            ExecutionEvent::ExecuteMerge { .. } => {
                println!("  {} merging", style("▶").cyan());
            }
            ExecutionEvent::ExecutionError { error, .. } => {
                println!("  {} {}", style("✗").red(), error.message);
            }
            _ => {}
        }
    }
}

fn build_options(config: &PilotConfig, args: &RunArgs) -> Result<ExecutionOptions> {
    let defaults = &config.toml.defaults;

    let permissions = match &args.phases {
        Some(list) => PhasePermissions::only(&parse_phase_list(list)?),
        None => defaults.permissions,
    };

    let mut options = ExecutionOptions::new(permissions)
        .with_review_flag(args.review.unwrap_or(defaults.review))
        .with_auto_merge(args.auto_merge || defaults.auto_merge);

    if let Some(timeout_ms) = args.timeout_ms {
        options = options.with_timeout_ms(timeout_ms);
    }

    if let Some(list) = &args.approved {
        let mut approvals = BTreeMap::new();
        for phase in parse_phase_list(list)? {
            if !phase.is_document_phase() {
                anyhow::bail!("Only document phases can be pre-approved, got '{}'", phase);
            }
            approvals.insert(phase, ApprovalStatus::approved());
        }
        options = options.with_approvals(approvals);
    }

    Ok(options)
}

fn resolve_unit_path(project_dir: &Path, unit_path: &Path) -> PathBuf {
    if unit_path.is_absolute() {
        unit_path.to_path_buf()
    } else {
        project_dir.join(unit_path)
    }
}

pub async fn cmd_run(config: &PilotConfig, args: RunArgs) -> Result<()> {
    let unit_dir = resolve_unit_path(&config.project_dir, &args.unit_path);
    let unit_path = unit_dir.to_string_lossy().to_string();
    let unit_id = match &args.id {
        Some(id) => id.clone(),
        None => unit_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("Cannot derive a unit id from the unit path; pass --id")?,
    };
    let owner_path = config.project_dir.to_string_lossy().to_string();
    let options = build_options(config, &args)?;

    let mut coordinator = AutoExecutionCoordinator::new(config.toml.coordinator_config());
    let (channel, events) = ChannelSubscriber::new();
    coordinator.subscribe(Arc::new(channel));
    coordinator.subscribe(Arc::new(AuditLogger::new(&config.audit_dir())));
    coordinator.subscribe(Arc::new(ConsoleReporter));

    println!();
    println!(
        "{} {} ({})",
        style("Running").bold(),
        style(&unit_id).cyan(),
        unit_path
    );
    println!(
        "  phases: {}",
        options
            .permissions
            .permitted_phases()
            .iter()
            .map(Phase::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let runner = AgentRunner::new(AgentRunnerConfig::from_pilot_config(config));
    println!("  agent: {}", runner.command());
    println!();

    coordinator
        .start(&owner_path, &unit_path, &unit_id, options)
        .with_context(|| format!("Failed to start {}", unit_path))?;

    if !unit_dir.is_dir() {
        coordinator.on_spec_read_error(
            &unit_path,
            &format!("{} is not a directory", unit_dir.display()),
        );
    }

    let interval = Duration::from_millis(config.toml.execution.timeout_check_interval_ms.max(1));
    let coordinator = Arc::new(Mutex::new(coordinator));
    let mut driver = Driver::new(Arc::clone(&coordinator), Arc::new(runner), events, interval);

    let records = driver.drive(std::slice::from_ref(&unit_path)).await;
    let record = records
        .get(&unit_path)
        .with_context(|| format!("No execution record for {}", unit_path))?;

    print_summary(record);

    if record.status == ExecutionStatus::Error {
        anyhow::bail!("Execution of {} failed", unit_id);
    }
    Ok(())
}

fn print_summary(record: &ExecutionRecord) {
    let status = match record.status {
        ExecutionStatus::Completed => style(record.status.as_str()).green(),
        ExecutionStatus::Paused => style(record.status.as_str()).yellow(),
        ExecutionStatus::Error => style(record.status.as_str()).red(),
        _ => style(record.status.as_str()).dim(),
    };

    println!();
    println!("{} {}", style("Status:").bold(), status);
    if !record.executed_phases.is_empty() {
        println!(
            "  executed: {}",
            record
                .executed_phases
                .iter()
                .map(Phase::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if record.status == ExecutionStatus::Paused {
        if let Some(phase) = record.current_phase {
            println!("  paused at: {}", phase);
        }
        if let Some(round) = record.current_review_round {
            println!("  review round: {}", round);
        }
    }
    for error in &record.errors {
        println!("  {} {}", style("error:").red(), error);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args() -> RunArgs {
        RunArgs {
            unit_path: PathBuf::from("specs/auth"),
            id: None,
            phases: None,
            approved: None,
            review: None,
            auto_merge: false,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_build_options_from_defaults() {
        let dir = tempdir().unwrap();
        let config = PilotConfig::new(dir.path().to_path_buf()).unwrap();
        let options = build_options(&config, &args()).unwrap();
        assert_eq!(options.permissions, config.toml.defaults.permissions);
        assert_eq!(options.review_flag, ReviewFlag::Run);
        assert!(options.timeout_ms.is_none());
    }

    #[test]
    fn test_build_options_cli_overrides() {
        let dir = tempdir().unwrap();
        let config = PilotConfig::new(dir.path().to_path_buf()).unwrap();
        let options = build_options(
            &config,
            &RunArgs {
                phases: Some("impl,inspection,deploy".into()),
                approved: Some("requirements".into()),
                review: Some(ReviewFlag::Pause),
                auto_merge: true,
                timeout_ms: Some(5_000),
                ..args()
            },
        )
        .unwrap();
        assert_eq!(
            options.permissions.permitted_phases(),
            vec![Phase::Impl, Phase::Inspection, Phase::Deploy]
        );
        assert!(options.merge_allowed());
        assert_eq!(options.timeout_ms, Some(5_000));
        assert_eq!(
            options.approval(Phase::Requirements),
            Some(ApprovalStatus::approved())
        );
    }

    #[test]
    fn test_build_options_rejects_non_document_approval() {
        let dir = tempdir().unwrap();
        let config = PilotConfig::new(dir.path().to_path_buf()).unwrap();
        let result = build_options(
            &config,
            &RunArgs {
                approved: Some("impl".into()),
                ..args()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unit_path() {
        let project = Path::new("/work/project");
        assert_eq!(
            resolve_unit_path(project, Path::new("specs/a")),
            PathBuf::from("/work/project/specs/a")
        );
        assert_eq!(
            resolve_unit_path(project, Path::new("/elsewhere/b")),
            PathBuf::from("/elsewhere/b")
        );
    }
}
