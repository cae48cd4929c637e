//! Audit trail inspection: `specpilot audit`.

use anyhow::Result;
use console::style;

use specpilot::audit::{AuditLogger, AuditRecord};
use specpilot::config::PilotConfig;

pub fn cmd_audit(
    config: &PilotConfig,
    unit: Option<&str>,
    errors_only: bool,
    json: bool,
    reset: bool,
) -> Result<()> {
    let logger = AuditLogger::new(&config.audit_dir());

    if reset {
        logger.reset()?;
        println!("Cleared {}", logger.events_file().display());
        return Ok(());
    }

    let records: Vec<AuditRecord> = match (unit, errors_only) {
        (Some(unit), _) => {
            let unit_path = config.project_dir.join(unit);
            logger
                .records_for_unit(&unit_path.to_string_lossy())?
                .into_iter()
                .filter(|r| !errors_only || r.is_error())
                .collect()
        }
        (None, true) => logger.errors()?,
        (None, false) => logger.load_all()?,
    };

    if json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    if records.is_empty() {
        println!("No audit records found.");
        return Ok(());
    }

    for record in &records {
        let event_type = if record.is_error() {
            style(record.event_type.as_str()).red()
        } else {
            style(record.event_type.as_str()).cyan()
        };
        println!(
            "{}  {:<20} {}",
            style(record.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            event_type,
            record.unit_path
        );
        if let Some(message) = record.payload.pointer("/error/message").and_then(|m| m.as_str()) {
            println!("    {}", message);
        }
    }
    println!();
    println!("{} record(s)", records.len());

    Ok(())
}
