//! Workflow error types.

use finvoice_core::error::FinvoiceError;
use finvoice_core::models::invoice::InvoiceStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("kyc not approved, cannot upload invoice")]
    KycNotApproved,

    #[error("a rejection reason is required")]
    RejectionReasonRequired,

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error("invoice not approved for disbursement (current status: {current})")]
    InvoiceNotApprovedForDisbursement { current: InvoiceStatus },

    #[error("invalid invoice status {current} for this operation")]
    InvalidInvoiceStatusForOperation { current: InvoiceStatus },

    /// Financed amount must be positive and the fee percentage non-negative.
    #[error("invalid disbursement terms: {0}")]
    InvalidDisbursementTerms(String),

    #[error("access to invoice denied")]
    AccessDenied,

    #[error("invoice {0} not found")]
    InvoiceNotFound(Uuid),

    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    #[error("kyc record not found for account {0}")]
    KycNotFound(Uuid),

    #[error("receipt not found for invoice {0}")]
    ReceiptNotFound(Uuid),

    #[error("file exceeds the maximum size of {max_bytes} bytes")]
    FileTooLarge { max_bytes: u64 },

    #[error("invoice {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    #[error("blob storage error: {0}")]
    Blob(String),

    #[error(transparent)]
    Repository(#[from] FinvoiceError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    /// Map a failed invoice read or write, keeping not-found and
    /// lost-update outcomes distinct from storage failures.
    pub(crate) fn from_invoice_store(id: Uuid, err: FinvoiceError) -> Self {
        match err {
            FinvoiceError::NotFound { .. } => WorkflowError::InvoiceNotFound(id),
            FinvoiceError::Conflict { .. } => WorkflowError::ConcurrentModification(id),
            other => WorkflowError::Repository(other),
        }
    }

    pub(crate) fn from_blob(err: FinvoiceError) -> Self {
        WorkflowError::Blob(err.to_string())
    }
}
