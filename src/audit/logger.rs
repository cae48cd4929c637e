use super::AuditRecord;
use crate::events::{EventSubscriber, ExecutionEvent};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends every coordinator event to `events.jsonl` in the audit directory.
pub struct AuditLogger {
    audit_dir: PathBuf,
    events_file: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            audit_dir: audit_dir.to_path_buf(),
            events_file: audit_dir.join("events.jsonl"),
        }
    }

    pub fn events_file(&self) -> &Path {
        &self.events_file
    }

    pub fn append(&self, event: &ExecutionEvent) -> Result<AuditRecord> {
        let record = AuditRecord::from_event(event).context("Failed to serialize audit event")?;
        let mut line =
            serde_json::to_string(&record).context("Failed to serialize audit record")?;
        line.push('\n');

        fs::create_dir_all(&self.audit_dir).context("Failed to create audit directory")?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_file)
            .context("Failed to open audit log")?
            .write_all(line.as_bytes())
            .context("Failed to write audit record")?;

        Ok(record)
    }

    /// All records in append order. Unparseable lines are skipped.
    pub fn load_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.events_file.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.events_file).context("Failed to read audit log")?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }

    pub fn records_for_unit(&self, unit_path: &str) -> Result<Vec<AuditRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.unit_path == unit_path)
            .collect())
    }

    pub fn errors(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.load_all()?.into_iter().filter(AuditRecord::is_error).collect())
    }

    pub fn reset(&self) -> Result<()> {
        if self.events_file.exists() {
            fs::remove_file(&self.events_file).context("Failed to remove audit log")?;
        }
        Ok(())
    }
}

impl EventSubscriber for AuditLogger {
    fn on_event(&self, event: &ExecutionEvent) {
        if let Err(e) = self.append(event) {
            tracing::warn!(
                error = %e,
                event_type = event.event_type(),
                "failed to write audit record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WorkflowErrorKind;
    use crate::events::WorkflowError;
    use crate::phase::Phase;
    use tempfile::TempDir;

    fn setup_logger() -> (AuditLogger, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let logger = AuditLogger::new(&dir.path().join("audit"));
        (logger, dir)
    }

    fn completed(unit: &str, phase: Phase) -> ExecutionEvent {
        ExecutionEvent::PhaseCompleted {
            unit_path: unit.to_string(),
            phase,
        }
    }

    #[test]
    fn test_empty_log_loads_nothing() {
        let (logger, _dir) = setup_logger();
        assert!(logger.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_creates_directory_and_preserves_order() {
        let (logger, _dir) = setup_logger();
        logger.append(&completed("a", Phase::Requirements)).unwrap();
        logger.append(&completed("b", Phase::Design)).unwrap();
        logger.append(&completed("a", Phase::Design)).unwrap();

        let all = logger.load_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].unit_path, "b");

        let for_a = logger.records_for_unit("a").unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(
            for_a[1].event().unwrap(),
            completed("a", Phase::Design)
        );
    }

    #[test]
    fn test_each_line_is_valid_json() {
        let (logger, _dir) = setup_logger();
        logger.on_event(&completed("a", Phase::Tasks));
        let content = std::fs::read_to_string(logger.events_file()).unwrap();
        for line in content.lines() {
            let value: serde_json::Value = serde_json::from_str(line).expect("valid JSON line");
            assert_eq!(value["event_type"], "phase-completed");
            assert_eq!(value["id"].as_str().unwrap().len(), 36);
        }
    }

    #[test]
    fn test_errors_filter() {
        let (logger, _dir) = setup_logger();
        logger.append(&completed("a", Phase::Impl)).unwrap();
        logger
            .append(&ExecutionEvent::ExecutionError {
                unit_path: "a".into(),
                error: WorkflowError {
                    kind: WorkflowErrorKind::Timeout,
                    phase: Some(Phase::Impl),
                    exit_code: None,
                    message: "timed out".into(),
                },
            })
            .unwrap();
        let errors = logger.errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].payload["error"]["type"], "TIMEOUT");
    }

    #[test]
    fn test_reset_removes_log() {
        let (logger, _dir) = setup_logger();
        logger.append(&completed("a", Phase::Impl)).unwrap();
        logger.reset().unwrap();
        assert!(logger.load_all().unwrap().is_empty());
    }
}
