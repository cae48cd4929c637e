use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use specpilot::config::PilotConfig;
use specpilot::orchestrator::ReviewFlag;

mod cmd;

#[derive(Parser)]
#[command(name = "specpilot")]
#[command(version, about = "Drives spec-driven development phases through AI agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the permitted phases of one unit to completion, pause or error
    Run {
        /// Directory holding the unit's documents
        unit_path: PathBuf,

        /// Unit identifier passed to the agent (defaults to the directory name)
        #[arg(long)]
        id: Option<String>,

        /// Phases allowed to run (comma-separated). Overrides [defaults.permissions]
        #[arg(long)]
        phases: Option<String>,

        /// Document phases already approved (comma-separated)
        #[arg(long)]
        approved: Option<String>,

        /// Document review loop: run or pause
        #[arg(long)]
        review: Option<ReviewFlag>,

        /// Merge after a passed inspection (needs deploy permitted)
        #[arg(long)]
        auto_merge: bool,

        /// Fail the run when it has been going longer than this
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show recorded execution events
    Audit {
        /// Only records for this unit path
        #[arg(long)]
        unit: Option<String>,

        /// Only execution errors
        #[arg(long)]
        errors: bool,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,

        /// Delete the audit log
        #[arg(long, conflicts_with_all = ["unit", "errors", "json"])]
        reset: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default specpilot.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = PilotConfig::new(project_dir)?.with_verbose(cli.verbose);

    let log_dir = config.toml.logging.log_dir.as_ref().map(|_| config.log_dir());
    let _guard =
        specpilot::logging::init_logging(&config.toml.logging, log_dir.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Run {
            unit_path,
            id,
            phases,
            approved,
            review,
            auto_merge,
            timeout_ms,
        } => {
            let args = cmd::RunArgs {
                unit_path,
                id,
                phases,
                approved,
                review,
                auto_merge,
                timeout_ms,
            };
            cmd::cmd_run(&config, args).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
        Commands::Audit {
            unit,
            errors,
            json,
            reset,
        } => cmd::cmd_audit(&config, unit.as_deref(), errors, json, reset)?,
    }

    Ok(())
}
