//! Spawns one agent process per requested phase and collects its output.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::signals::{AgentVerdicts, parse_verdicts};
use crate::config::PilotConfig;
use crate::errors::RunnerError;
use crate::phase::Phase;

/// What the agent is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    pub owner_path: String,
    pub unit_path: String,
    pub unit_id: String,
    pub phase: Phase,
    pub review_round: Option<u32>,
}

/// Finished agent process.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub exit_code: i32,
    pub output: String,
    pub verdicts: AgentVerdicts,
    pub duration_ms: u128,
}

impl AgentRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the agent for one phase request.
/// Real implementation: `AgentRunner`. Tests substitute scripted doubles.
#[async_trait]
pub trait PhaseAgent: Send + Sync {
    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentRun, RunnerError>;
}

#[derive(Debug, Clone)]
pub struct AgentRunnerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl AgentRunnerConfig {
    pub fn from_pilot_config(config: &PilotConfig) -> Self {
        Self {
            command: config.toml.agent_cmd(),
            args: config.toml.agent.args.clone(),
            working_dir: config.agent_working_dir(),
        }
    }
}

pub struct AgentRunner {
    config: AgentRunnerConfig,
}

impl AgentRunner {
    pub fn new(config: AgentRunnerConfig) -> Self {
        Self { config }
    }

    pub fn command(&self) -> &str {
        &self.config.command
    }

    /// Substitute invocation placeholders into the configured arguments.
    pub fn render_args(&self, invocation: &AgentInvocation) -> Vec<String> {
        let round = invocation
            .review_round
            .map(|r| r.to_string())
            .unwrap_or_default();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{phase}", invocation.phase.as_str())
                    .replace("{unit_path}", &invocation.unit_path)
                    .replace("{unit_id}", &invocation.unit_id)
                    .replace("{owner_path}", &invocation.owner_path)
                    .replace("{round}", &round)
            })
            .collect()
    }

    /// Run the agent to exit.
    ///
    /// A non-zero exit is returned as an `AgentRun`, not an error; only
    /// failing to launch or supervise the process is an error. The child is
    /// killed if this future is dropped.
    pub async fn run(&self, invocation: &AgentInvocation) -> Result<AgentRun, RunnerError> {
        let args = self.render_args(invocation);
        debug!(
            command = %self.config.command,
            args = ?args,
            phase = %invocation.phase,
            "spawning agent"
        );

        let start = Instant::now();
        let mut child = Command::new(&self.config.command)
            .args(&args)
            .env("SPECPILOT_PHASE", invocation.phase.as_str())
            .env("SPECPILOT_UNIT_PATH", &invocation.unit_path)
            .env("SPECPILOT_UNIT_ID", &invocation.unit_id)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::SpawnFailed {
                command: self.config.command.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(RunnerError::MissingStdout)?;
        let mut reader = BufReader::new(stdout).lines();

        let mut output = String::new();
        while let Some(line) = reader.next_line().await.map_err(RunnerError::ReadFailed)? {
            debug!(phase = %invocation.phase, "agent: {}", line);
            output.push_str(&line);
            output.push('\n');
        }

        let status = child.wait().await.map_err(RunnerError::WaitFailed)?;
        // Killed by a signal has no code.
        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis();

        info!(
            phase = %invocation.phase,
            unit_path = %invocation.unit_path,
            exit_code,
            duration_ms,
            "agent exited"
        );

        Ok(AgentRun {
            exit_code,
            verdicts: parse_verdicts(&output),
            output,
            duration_ms,
        })
    }
}

#[async_trait]
impl PhaseAgent for AgentRunner {
    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentRun, RunnerError> {
        AgentRunner::run(self, invocation).await
    }
}
