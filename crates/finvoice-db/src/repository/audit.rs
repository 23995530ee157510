//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The `audit_log` table rejects updates and deletes at the schema level.

use chrono::{DateTime, Utc};
use finvoice_core::error::FinvoiceResult;
use finvoice_core::models::audit::{AuditLogEntry, CreateAuditLogEntry};
use finvoice_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    actor_id: Option<String>,
    subject_id: Option<String>,
    action: String,
    details: serde_json::Value,
    source_ip: Option<String>,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid("audit_log", &self.record_id)?,
            actor_id: parse_opt_uuid("actor", self.actor_id)?,
            subject_id: parse_opt_uuid("subject", self.subject_id)?,
            action: self.action,
            details: self.details,
            source_ip: self.source_ip,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

fn where_clause(filter: &AuditLogFilter) -> String {
    let mut conditions = Vec::new();
    if filter.actor_id.is_some() {
        conditions.push("actor_id = $actor_id");
    }
    if filter.subject_id.is_some() {
        conditions.push("subject_id = $subject_id");
    }
    if filter.action.is_some() {
        conditions.push("action = $action");
    }
    if filter.from.is_some() {
        conditions.push("timestamp >= $from");
    }
    if filter.to.is_some() {
        conditions.push("timestamp <= $to");
    }
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> FinvoiceResult<AuditLogEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 actor_id = $actor_id, subject_id = $subject_id, \
                 action = $action, details = $details, \
                 source_ip = $source_ip, timestamp = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("actor_id", input.actor_id.map(|id| id.to_string())))
            .bind(("subject_id", input.subject_id.map(|id| id.to_string())))
            .bind(("action", input.action))
            .bind(("details", input.details))
            .bind(("source_ip", input.source_ip))
            .await
            .map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| DbError::write_failed("audit_log", e))?;

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('audit_log', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_log".into(),
            id: id_str,
        })?;
        Ok(row.try_into_entry()?)
    }

    async fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> FinvoiceResult<PaginatedResult<AuditLogEntry>> {
        let clause = where_clause(&filter);
        let query = format!(
            "SELECT count() AS total FROM audit_log {clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_log {clause} \
             ORDER BY timestamp DESC LIMIT $limit START $offset;"
        );

        let mut result = self
            .db
            .query(&query)
            .bind(("actor_id", filter.actor_id.map(|id| id.to_string())))
            .bind(("subject_id", filter.subject_id.map(|id| id.to_string())))
            .bind(("action", filter.action))
            .bind(("from", filter.from))
            .bind(("to", filter.to))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<AuditRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(AuditRow::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
