//! SurrealDB implementation of [`InvoiceRepository`].
//!
//! Every write after creation is a full-row update guarded by the row
//! version and status the caller read
//! (`WHERE version = $version AND status = $expected`) and bumps the
//! version. A guard miss is reported as [`DbError::Conflict`], so of two
//! writers holding the same copy only the first lands, whether or not
//! either of them changes the status. Disbursement writes the invoice and
//! its ledger entry in a single transaction.

use chrono::{DateTime, NaiveDate, Utc};
use finvoice_core::error::FinvoiceResult;
use finvoice_core::models::invoice::{CreateInvoice, Invoice, InvoiceStatus};
use finvoice_core::models::ledger::{CreateLedgerTransaction, LedgerTransaction};
use finvoice_core::repository::{InvoiceRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::ledger::fetch_ledger_transaction;
use crate::error::{DbError, parse_decimal, parse_opt_uuid, parse_uuid};

const INVOICE_FIELDS: &str = "\
    status = $status, invoice_number = $invoice_number, \
    amount = $amount, currency = $currency, due_date = $due_date, \
    debtor_name = $debtor_name, issuer_name = $issuer_name, \
    original_file_path = $original_file_path, \
    financing_fee_percentage = $financing_fee_percentage, \
    financed_amount = $financed_amount, \
    approved_by_id = $approved_by_id, approved_at = $approved_at, \
    disbursed_by_id = $disbursed_by_id, disbursed_at = $disbursed_at, \
    receipt_path = $receipt_path, rejection_reason = $rejection_reason, \
    version = $version + 1, updated_at = time::now()";

const WRITE_GUARD: &str = "WHERE version = $version AND status = $expected";

/// Bind every mutable invoice column, matching [`INVOICE_FIELDS`].
macro_rules! bind_invoice {
    ($builder:expr, $invoice:expr) => {{
        let invoice: &Invoice = $invoice;
        $builder
            .bind(("id", invoice.id.to_string()))
            .bind(("status", invoice.status.as_str().to_string()))
            .bind(("invoice_number", invoice.invoice_number.clone()))
            .bind(("amount", invoice.amount.to_string()))
            .bind(("currency", invoice.currency.clone()))
            .bind(("due_date", invoice.due_date.map(|d| d.to_string())))
            .bind(("debtor_name", invoice.debtor_name.clone()))
            .bind(("issuer_name", invoice.issuer_name.clone()))
            .bind(("original_file_path", invoice.original_file_path.clone()))
            .bind((
                "financing_fee_percentage",
                invoice.financing_fee_percentage.map(|d| d.to_string()),
            ))
            .bind(("financed_amount", invoice.financed_amount.map(|d| d.to_string())))
            .bind(("approved_by_id", invoice.approved_by_id.map(|id| id.to_string())))
            .bind(("approved_at", invoice.approved_at))
            .bind(("disbursed_by_id", invoice.disbursed_by_id.map(|id| id.to_string())))
            .bind(("disbursed_at", invoice.disbursed_at))
            .bind(("receipt_path", invoice.receipt_path.clone()))
            .bind(("rejection_reason", invoice.rejection_reason.clone()))
            .bind(("version", invoice.version))
    }};
}

#[derive(Debug, SurrealValue)]
struct InvoiceRow {
    record_id: String,
    owner_id: String,
    status: String,
    invoice_number: Option<String>,
    amount: String,
    currency: String,
    due_date: Option<String>,
    debtor_name: Option<String>,
    issuer_name: Option<String>,
    original_file_path: String,
    financing_fee_percentage: Option<String>,
    financed_amount: Option<String>,
    approved_by_id: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    disbursed_by_id: Option<String>,
    disbursed_at: Option<DateTime<Utc>>,
    receipt_path: Option<String>,
    rejection_reason: Option<String>,
    uploaded_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl InvoiceRow {
    fn try_into_invoice(self) -> Result<Invoice, DbError> {
        let status = InvoiceStatus::parse(&self.status)
            .ok_or_else(|| DbError::Decode(format!("unknown invoice status: {}", self.status)))?;
        let due_date = self
            .due_date
            .map(|d| {
                d.parse::<NaiveDate>()
                    .map_err(|e| DbError::Decode(format!("invalid due date: {e}")))
            })
            .transpose()?;
        let financing_fee_percentage = self
            .financing_fee_percentage
            .map(|v| parse_decimal("financing_fee_percentage", &v))
            .transpose()?;
        let financed_amount = self
            .financed_amount
            .map(|v| parse_decimal("financed_amount", &v))
            .transpose()?;

        Ok(Invoice {
            id: parse_uuid("invoice", &self.record_id)?,
            owner_id: parse_uuid("owner", &self.owner_id)?,
            status,
            invoice_number: self.invoice_number,
            amount: parse_decimal("amount", &self.amount)?,
            currency: self.currency,
            due_date,
            debtor_name: self.debtor_name,
            issuer_name: self.issuer_name,
            original_file_path: self.original_file_path,
            financing_fee_percentage,
            financed_amount,
            approved_by_id: parse_opt_uuid("approved_by", self.approved_by_id)?,
            approved_at: self.approved_at,
            disbursed_by_id: parse_opt_uuid("disbursed_by", self.disbursed_by_id)?,
            disbursed_at: self.disbursed_at,
            receipt_path: self.receipt_path,
            rejection_reason: self.rejection_reason,
            uploaded_at: self.uploaded_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Clone)]
pub struct SurrealInvoiceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealInvoiceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Explain a guarded write that did not apply: the row is gone, it was
    /// written underneath the caller, or the statement itself failed.
    async fn failed_write(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
        cause: Option<surrealdb::Error>,
    ) -> DbError {
        let id = invoice.id;
        match self.get_by_id(id).await {
            Ok(current)
                if current.version != invoice.version
                    || current.status != expected
                    || cause.is_none() =>
            {
                debug!(
                    invoice_id = %id,
                    expected_status = %expected,
                    actual_status = %current.status,
                    expected_version = invoice.version,
                    actual_version = current.version,
                    "Invoice write guard rejected write"
                );
                DbError::Conflict {
                    entity: "invoice".into(),
                    id: id.to_string(),
                }
            }
            Ok(_) => match cause {
                Some(e) => DbError::write_failed("invoice", e),
                None => DbError::Query("guarded write failed".into()),
            },
            Err(e) if e.is_not_found() => DbError::NotFound {
                entity: "invoice".into(),
                id: id.to_string(),
            },
            Err(e) => DbError::Query(e.to_string()),
        }
    }

    async fn page(
        &self,
        filter: &str,
        key: &'static str,
        value: Option<String>,
        pagination: Pagination,
    ) -> FinvoiceResult<PaginatedResult<Invoice>> {
        let count_sql = format!("SELECT count() AS total FROM invoice {filter} GROUP ALL");
        let mut count_result = self
            .db
            .query(&count_sql)
            .bind((key, value.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let select_sql = format!(
            "SELECT meta::id(id) AS record_id, * FROM invoice {filter} \
             ORDER BY uploaded_at DESC \
             LIMIT $limit START $offset"
        );
        let mut result = self
            .db
            .query(&select_sql)
            .bind((key, value))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvoiceRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_invoice())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

impl<C: Connection> InvoiceRepository for SurrealInvoiceRepository<C> {
    async fn create(&self, input: CreateInvoice) -> FinvoiceResult<Invoice> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('invoice', $id) SET \
                 owner_id = $owner_id, status = 'pending_review', \
                 invoice_number = $invoice_number, amount = $amount, \
                 currency = $currency, due_date = $due_date, \
                 original_file_path = $original_file_path, version = 0",
            )
            .bind(("id", id.to_string()))
            .bind(("owner_id", input.owner_id.to_string()))
            .bind(("invoice_number", input.invoice_number))
            .bind(("amount", input.amount.to_string()))
            .bind(("currency", input.currency))
            .bind(("due_date", input.due_date.map(|d| d.to_string())))
            .bind(("original_file_path", input.original_file_path))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::write_failed("invoice", e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> FinvoiceResult<Invoice> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('invoice', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvoiceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "invoice".into(),
            id: id_str,
        })?;
        Ok(row.try_into_invoice()?)
    }

    async fn save(&self, invoice: &Invoice, expected_status: InvoiceStatus) -> FinvoiceResult<Invoice> {
        let query =
            format!("UPDATE type::record('invoice', $id) SET {INVOICE_FIELDS} {WRITE_GUARD}");
        let builder = self
            .db
            .query(&query)
            .bind(("expected", expected_status.as_str().to_string()));
        let outcome = bind_invoice!(builder, invoice)
            .await
            .map_err(DbError::from)?
            .check();
        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => {
                return Err(self.failed_write(invoice, expected_status, Some(e)).await.into());
            }
        };

        let touched: Vec<surrealdb_types::Value> = result.take(0).map_err(DbError::from)?;
        if touched.is_empty() {
            return Err(self.failed_write(invoice, expected_status, None).await.into());
        }

        self.get_by_id(invoice.id).await
    }

    async fn save_with_ledger_entry(
        &self,
        invoice: &Invoice,
        expected_status: InvoiceStatus,
        ledger_entry: CreateLedgerTransaction,
    ) -> FinvoiceResult<(Invoice, LedgerTransaction)> {
        let tx_id = Uuid::new_v4();
        let query = format!(
            "BEGIN TRANSACTION; \
             LET $touched = (UPDATE type::record('invoice', $id) SET {INVOICE_FIELDS} \
                 {WRITE_GUARD}); \
             IF array::len($touched) = 0 {{ THROW 'invoice write guard rejected write' }}; \
             CREATE type::record('ledger_transaction', $tx_id) SET \
                 invoice_id = $tx_invoice_id, kind = $tx_kind, amount = $tx_amount, \
                 occurred_at = $tx_occurred_at, reference_id = $tx_reference_id; \
             COMMIT TRANSACTION;"
        );

        let builder = self
            .db
            .query(&query)
            .bind(("expected", expected_status.as_str().to_string()))
            .bind(("tx_id", tx_id.to_string()))
            .bind(("tx_invoice_id", ledger_entry.invoice_id.to_string()))
            .bind(("tx_kind", ledger_entry.kind.as_str().to_string()))
            .bind(("tx_amount", ledger_entry.amount.to_string()))
            .bind(("tx_occurred_at", ledger_entry.occurred_at))
            .bind(("tx_reference_id", ledger_entry.reference_id));
        let outcome = bind_invoice!(builder, invoice)
            .await
            .map_err(DbError::from)?
            .check();

        // Both writes roll back together on any failure.
        if let Err(e) = outcome {
            return Err(self.failed_write(invoice, expected_status, Some(e)).await.into());
        }

        let saved = self.get_by_id(invoice.id).await?;
        let tx = fetch_ledger_transaction(&self.db, tx_id).await?;
        Ok((saved, tx))
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> FinvoiceResult<PaginatedResult<Invoice>> {
        self.page(
            "WHERE owner_id = $owner_id",
            "owner_id",
            Some(owner_id.to_string()),
            pagination,
        )
        .await
    }

    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> FinvoiceResult<PaginatedResult<Invoice>> {
        match status {
            Some(status) => {
                self.page(
                    "WHERE status = $status",
                    "status",
                    Some(status.as_str().to_string()),
                    pagination,
                )
                .await
            }
            None => self.page("", "status", None, pagination).await,
        }
    }
}
