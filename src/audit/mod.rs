use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::ExecutionEvent;

/// One durable line in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub unit_path: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl AuditRecord {
    pub fn from_event(event: &ExecutionEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            unit_path: event.unit_path().to_string(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// Decode the payload back into the event it was built from.
    pub fn event(&self) -> serde_json::Result<ExecutionEvent> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn is_error(&self) -> bool {
        self.event_type == "execution-error"
    }
}

pub mod logger;
pub use logger::AuditLogger;
