//! SurrealDB implementation of [`LedgerRepository`].
//!
//! Entries are only ever written by
//! [`InvoiceRepository::save_with_ledger_entry`](finvoice_core::repository::InvoiceRepository::save_with_ledger_entry).

use chrono::{DateTime, Utc};
use finvoice_core::error::FinvoiceResult;
use finvoice_core::models::ledger::{LedgerTransaction, TransactionType};
use finvoice_core::repository::LedgerRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_decimal, parse_uuid};

#[derive(Debug, SurrealValue)]
struct LedgerRow {
    record_id: String,
    invoice_id: String,
    kind: String,
    amount: String,
    occurred_at: DateTime<Utc>,
    reference_id: Option<String>,
}

impl LedgerRow {
    fn try_into_transaction(self) -> Result<LedgerTransaction, DbError> {
        let kind = TransactionType::parse(&self.kind)
            .ok_or_else(|| DbError::Decode(format!("unknown transaction type: {}", self.kind)))?;
        Ok(LedgerTransaction {
            id: parse_uuid("ledger_transaction", &self.record_id)?,
            invoice_id: parse_uuid("invoice", &self.invoice_id)?,
            kind,
            amount: parse_decimal("amount", &self.amount)?,
            occurred_at: self.occurred_at,
            reference_id: self.reference_id,
        })
    }
}

pub(crate) async fn fetch_ledger_transaction<C: Connection>(
    db: &Surreal<C>,
    id: Uuid,
) -> Result<LedgerTransaction, DbError> {
    let id_str = id.to_string();
    let mut result = db
        .query("SELECT meta::id(id) AS record_id, * FROM type::record('ledger_transaction', $id)")
        .bind(("id", id_str.clone()))
        .await?;

    let rows: Vec<LedgerRow> = result.take(0)?;
    let row = rows.into_iter().next().ok_or(DbError::NotFound {
        entity: "ledger_transaction".into(),
        id: id_str,
    })?;
    row.try_into_transaction()
}

#[derive(Clone)]
pub struct SurrealLedgerRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealLedgerRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> LedgerRepository for SurrealLedgerRepository<C> {
    async fn list_by_invoice(&self, invoice_id: Uuid) -> FinvoiceResult<Vec<LedgerTransaction>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM ledger_transaction \
                 WHERE invoice_id = $invoice_id ORDER BY occurred_at ASC",
            )
            .bind(("invoice_id", invoice_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<LedgerRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(LedgerRow::try_into_transaction)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
