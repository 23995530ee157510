//! SurrealDB-backed [`KeyValueStore`].
//!
//! Entries are keyed by record id and carry an `expires_at` timestamp.
//! Reads ignore expired rows; [`SurrealKeyValueStore::purge_expired`]
//! removes them.

use std::time::Duration;

use finvoice_core::error::FinvoiceResult;
use finvoice_core::external::KeyValueStore;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ValueRow {
    value: String,
}

#[derive(Clone)]
pub struct SurrealKeyValueStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealKeyValueStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Delete every expired entry.
    pub async fn purge_expired(&self) -> FinvoiceResult<()> {
        self.db
            .query("DELETE kv_entry WHERE expires_at <= time::now()")
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        debug!("Purged expired key-value entries");
        Ok(())
    }
}

impl<C: Connection> KeyValueStore for SurrealKeyValueStore<C> {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> FinvoiceResult<()> {
        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| DbError::Query(format!("ttl out of range: {e}")))?;

        self.db
            .query(
                "UPSERT type::record('kv_entry', $key) SET \
                 value = $value, expires_at = $expires_at",
            )
            .bind(("key", key.to_string()))
            .bind(("value", value.to_string()))
            .bind(("expires_at", expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> FinvoiceResult<Option<String>> {
        let mut result = self
            .db
            .query(
                "SELECT `value` FROM type::record('kv_entry', $key) \
                 WHERE expires_at > time::now()",
            )
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ValueRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(|r| r.value))
    }

    async fn delete(&self, key: &str) -> FinvoiceResult<()> {
        self.db
            .query("DELETE type::record('kv_entry', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
