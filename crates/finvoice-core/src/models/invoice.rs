//! Invoice domain model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    PendingReview,
    Approved,
    Rejected,
    Disbursed,
    RepaymentPending,
    Repaid,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::PendingReview,
        InvoiceStatus::Approved,
        InvoiceStatus::Rejected,
        InvoiceStatus::Disbursed,
        InvoiceStatus::RepaymentPending,
        InvoiceStatus::Repaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::PendingReview => "pending_review",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Disbursed => "disbursed",
            InvoiceStatus::RepaymentPending => "repayment_pending",
            InvoiceStatus::Repaid => "repaid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: InvoiceStatus,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub debtor_name: Option<String>,
    pub issuer_name: Option<String>,
    /// Path of the uploaded document, relative to the blob root.
    pub original_file_path: String,
    pub financing_fee_percentage: Option<Decimal>,
    pub financed_amount: Option<Decimal>,
    pub approved_by_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_by_id: Option<Uuid>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub receipt_path: Option<String>,
    pub rejection_reason: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented by every write; guarded writes compare against it.
    pub version: u64,
}

#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub owner_id: Uuid,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub original_file_path: String,
}
