//! Append-only ledger of money movements tied to invoices.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Disbursement,
    Repayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Disbursement => "disbursement",
            TransactionType::Repayment => "repayment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disbursement" => Some(TransactionType::Disbursement),
            "repayment" => Some(TransactionType::Repayment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateLedgerTransaction {
    pub invoice_id: Uuid,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub reference_id: Option<String>,
}
