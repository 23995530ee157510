//! The invoice status transition table.
//!
//! ```text
//! pending_review    -> approved | rejected
//! approved          -> disbursed
//! disbursed         -> repayment_pending
//! disbursed         -> repaid
//! repayment_pending -> repaid
//! ```
//!
//! Requests for `disbursed` and `repaid` from the wrong state report
//! dedicated errors; every other illegal pair is an
//! `InvalidStatusTransition`.

use finvoice_core::models::invoice::InvoiceStatus;

use crate::error::WorkflowError;

/// Check that a staff member may move an invoice from `from` to `to`.
pub fn check(from: InvoiceStatus, to: InvoiceStatus) -> Result<(), WorkflowError> {
    use InvoiceStatus::*;

    let allowed = match to {
        Approved | Rejected => from == PendingReview,
        Disbursed => {
            if from != Approved {
                return Err(WorkflowError::InvoiceNotApprovedForDisbursement { current: from });
            }
            true
        }
        RepaymentPending => from == Disbursed,
        Repaid => {
            if !matches!(from, Disbursed | RepaymentPending) {
                return Err(WorkflowError::InvalidInvoiceStatusForOperation { current: from });
            }
            true
        }
        // Invoices enter review only on upload.
        PendingReview => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::InvalidStatusTransition { from, to })
    }
}

/// Whether `from -> to` is an edge of the table.
pub fn is_allowed(from: InvoiceStatus, to: InvoiceStatus) -> bool {
    check(from, to).is_ok()
}
