//! Configuration for specpilot, read from `.specpilot/specpilot.toml`.
//!
//! Layered as file → environment → CLI. Every section is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [execution]
//! max_concurrent = 5
//! timeout_ms = 1800000
//! timeout_check_interval_ms = 30000
//!
//! [agent]
//! command = "claude"
//! args = ["-p", "/kiro:spec-{phase} {unit_id}"]
//!
//! [defaults]
//! review = "run"
//! auto_merge = false
//!
//! [defaults.permissions]
//! requirements = true
//! design = true
//! tasks = true
//! document-review = true
//! impl = false
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::orchestrator::{
    CoordinatorConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_TIMEOUT_MS, ReviewFlag,
};
use crate::phase::{Phase, PhasePermissions};

/// Name of the project-local state directory.
pub const PILOT_DIR: &str = ".specpilot";

/// Concurrency and stall detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How often the runner polls for timed-out units.
    #[serde(default = "default_timeout_check_interval_ms")]
    pub timeout_check_interval_ms: u64,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_timeout_check_interval_ms() -> u64 {
    30_000
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            timeout_check_interval_ms: default_timeout_check_interval_ms(),
        }
    }
}

/// How the agent process is launched.
///
/// `args` entries may contain `{phase}`, `{unit_path}`, `{unit_id}`,
/// `{owner_path}` and `{round}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_agent_args() -> Vec<String> {
    vec![
        "-p".to_string(),
        "/kiro:spec-{phase} {unit_id}".to_string(),
    ]
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: None,
            args: default_agent_args(),
            working_dir: None,
        }
    }
}

/// Options applied to `specpilot run` unless overridden on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_permissions")]
    pub permissions: PhasePermissions,
    #[serde(default)]
    pub review: ReviewFlag,
    #[serde(default)]
    pub auto_merge: bool,
}

fn default_permissions() -> PhasePermissions {
    PhasePermissions::only(&[
        Phase::Requirements,
        Phase::Design,
        Phase::Tasks,
        Phase::DocumentReview,
    ])
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            permissions: default_permissions(),
            review: ReviewFlag::default(),
            auto_merge: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write JSON logs to daily-rotated files here.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
        }
    }
}

/// The complete specpilot.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotToml {
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PilotToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse specpilot.toml")
    }

    /// Load from `<pilot_dir>/specpilot.toml`, or defaults if it does not exist.
    pub fn load_or_default(pilot_dir: &Path) -> Result<Self> {
        let config_path = pilot_dir.join("specpilot.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize specpilot.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Agent command: file, then `SPECPILOT_AGENT_CMD`, then `claude`.
    pub fn agent_cmd(&self) -> String {
        self.agent
            .command
            .clone()
            .or_else(|| std::env::var("SPECPILOT_AGENT_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Concurrency ceiling; `SPECPILOT_MAX_CONCURRENT` overrides the file.
    pub fn max_concurrent(&self) -> usize {
        std::env::var("SPECPILOT_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.execution.max_concurrent)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrent: self.max_concurrent(),
            default_timeout_ms: self.execution.timeout_ms,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.execution.max_concurrent == 0 {
            warnings.push("execution.max_concurrent is 0: no unit can ever start".to_string());
        }
        if self.execution.timeout_ms == 0 {
            warnings.push("execution.timeout_ms is 0: every running unit times out".to_string());
        }
        if self.execution.timeout_check_interval_ms == 0 {
            warnings.push("execution.timeout_check_interval_ms must be positive".to_string());
        }
        if !self.agent.args.iter().any(|a| a.contains("{phase}")) {
            warnings.push(
                "agent.args has no {phase} placeholder: every phase receives the same arguments"
                    .to_string(),
            );
        }
        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.logging.level.to_lowercase().as_str())
        {
            warnings.push(format!("Invalid logging.level '{}'", self.logging.level));
        }

        warnings
    }
}

/// Configuration bound to a project directory, with CLI overrides applied.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub project_dir: PathBuf,
    pub pilot_dir: PathBuf,
    pub toml: PilotToml,
    pub verbose: bool,
}

impl PilotConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let pilot_dir = project_dir.join(PILOT_DIR);
        let toml = PilotToml::load_or_default(&pilot_dir)?;

        Ok(Self {
            project_dir,
            pilot_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.pilot_dir.join("specpilot.toml")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.pilot_dir.join("audit")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.toml
            .logging
            .log_dir
            .clone()
            .unwrap_or_else(|| self.pilot_dir.join("logs"))
    }

    /// Directory the agent runs in.
    pub fn agent_working_dir(&self) -> PathBuf {
        match &self.toml.agent.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.project_dir.join(dir),
            None => self.project_dir.clone(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
