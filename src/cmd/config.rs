//! Configuration view and validation commands: `specpilot config`.

use anyhow::Result;

use super::super::ConfigCommands;
use specpilot::config::{PilotConfig, PilotToml};

pub fn cmd_config(config: &PilotConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Specpilot Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No specpilot.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = &config.toml;
            println!("[execution]");
            println!("  max_concurrent = {}", toml.execution.max_concurrent);
            println!("  timeout_ms = {}", toml.execution.timeout_ms);
            println!(
                "  timeout_check_interval_ms = {}",
                toml.execution.timeout_check_interval_ms
            );
            println!();

            println!("[agent]");
            if let Some(cmd) = &toml.agent.command {
                println!("  command = \"{}\"", cmd);
            }
            println!("  args = {:?}", toml.agent.args);
            if let Some(dir) = &toml.agent.working_dir {
                println!("  working_dir = \"{}\"", dir.display());
            }
            println!();

            println!("[defaults]");
            let phases: Vec<&str> = toml
                .defaults
                .permissions
                .permitted_phases()
                .iter()
                .map(|p| p.as_str())
                .collect();
            println!("  permitted phases = [{}]", phases.join(", "));
            println!("  review = \"{}\"", toml.defaults.review);
            println!("  auto_merge = {}", toml.defaults.auto_merge);
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  format = {:?}", toml.logging.format);
            println!();

            println!("Effective values (with env overrides):");
            println!("  agent command = \"{}\"", toml.agent_cmd());
            println!("  max_concurrent = {}", toml.max_concurrent());
            println!("  audit dir = {}", config.audit_dir().display());
            println!();

            if !config_path.exists() {
                println!("Run 'specpilot config init' to create a specpilot.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No specpilot.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("specpilot.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.pilot_dir)?;
            PilotToml::default().save(&config_path)?;

            println!("Created specpilot.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [execution] max_concurrent, timeout_ms");
            println!("  - [agent] command, args");
            println!("  - [defaults.permissions] which phases run without stopping");
            println!();
        }
    }

    Ok(())
}
