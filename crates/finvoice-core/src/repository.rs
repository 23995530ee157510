//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Not-found is always reported as
//! [`FinvoiceError::NotFound`](crate::error::FinvoiceError::NotFound) so
//! callers can tell it apart from storage failures.

use uuid::Uuid;

use crate::error::FinvoiceResult;
use crate::models::{
    account::{CreateStaff, CreateUser, Staff, UpdateUser, User},
    audit::{AuditLogEntry, CreateAuditLogEntry},
    invoice::{CreateInvoice, Invoice, InvoiceStatus},
    kyc::{KycRecord, UpsertKyc},
    ledger::{CreateLedgerTransaction, LedgerTransaction},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, input: CreateUser) -> impl Future<Output = FinvoiceResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FinvoiceResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = FinvoiceResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = FinvoiceResult<User>> + Send;
}

pub trait StaffRepository: Send + Sync {
    fn create(&self, input: CreateStaff) -> impl Future<Output = FinvoiceResult<Staff>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FinvoiceResult<Staff>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = FinvoiceResult<Staff>> + Send;
    fn record_login(&self, id: Uuid) -> impl Future<Output = FinvoiceResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// KYC (one record per owner)
// ---------------------------------------------------------------------------

pub trait KycRepository: Send + Sync {
    /// Insert or replace the owner's record.
    fn upsert(&self, input: UpsertKyc) -> impl Future<Output = FinvoiceResult<KycRecord>> + Send;
    fn get_by_owner(
        &self,
        owner_id: Uuid,
    ) -> impl Future<Output = FinvoiceResult<KycRecord>> + Send;
}

// ---------------------------------------------------------------------------
// Invoices & ledger
// ---------------------------------------------------------------------------

pub trait InvoiceRepository: Send + Sync {
    fn create(&self, input: CreateInvoice) -> impl Future<Output = FinvoiceResult<Invoice>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FinvoiceResult<Invoice>> + Send;

    /// Full-row write of `invoice`, applied only while the stored row is
    /// still at `invoice.version` and `expected_status`. Fails with
    /// `Conflict` when another write got there first.
    fn save(
        &self,
        invoice: &Invoice,
        expected_status: InvoiceStatus,
    ) -> impl Future<Output = FinvoiceResult<Invoice>> + Send;

    /// Write `invoice` and append `ledger_entry` in one atomic unit,
    /// with the same precondition as [`InvoiceRepository::save`].
    fn save_with_ledger_entry(
        &self,
        invoice: &Invoice,
        expected_status: InvoiceStatus,
        ledger_entry: CreateLedgerTransaction,
    ) -> impl Future<Output = FinvoiceResult<(Invoice, LedgerTransaction)>> + Send;

    fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = FinvoiceResult<PaginatedResult<Invoice>>> + Send;

    fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> impl Future<Output = FinvoiceResult<PaginatedResult<Invoice>>> + Send;
}

pub trait LedgerRepository: Send + Sync {
    fn list_by_invoice(
        &self,
        invoice_id: Uuid,
    ) -> impl Future<Output = FinvoiceResult<Vec<LedgerTransaction>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = FinvoiceResult<AuditLogEntry>> + Send;
    fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = FinvoiceResult<PaginatedResult<AuditLogEntry>>> + Send;
}
