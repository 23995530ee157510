//! Audit log domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Staff member or user who performed the action, if any.
    pub actor_id: Option<Uuid>,
    /// Account the action concerns.
    pub subject_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub source_ip: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAuditLogEntry {
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub source_ip: Option<String>,
}

impl CreateAuditLogEntry {
    pub fn new(action: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            actor_id: None,
            subject_id: None,
            action: action.into(),
            details,
            source_ip: None,
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn subject(mut self, subject_id: Uuid) -> Self {
        self.subject_id = Some(subject_id);
        self
    }
}
