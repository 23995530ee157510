//! KYC (know-your-customer) verification record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
    ResubmitRequired,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
            KycStatus::ResubmitRequired => "resubmit_required",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(KycStatus::Pending),
            "approved" => Some(KycStatus::Approved),
            "rejected" => Some(KycStatus::Rejected),
            "resubmit_required" => Some(KycStatus::ResubmitRequired),
            _ => None,
        }
    }
}

impl std::fmt::Display for KycStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most one record exists per owner; writes are upserts keyed by
/// `owner_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: KycStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    /// Opaque document metadata supplied by the owner.
    pub documents_info: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full-row write for [`crate::repository::KycRepository::upsert`].
#[derive(Debug, Clone)]
pub struct UpsertKyc {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: KycStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub documents_info: serde_json::Value,
}

impl From<KycRecord> for UpsertKyc {
    fn from(record: KycRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            status: record.status,
            submitted_at: record.submitted_at,
            reviewed_at: record.reviewed_at,
            reviewer_id: record.reviewer_id,
            rejection_reason: record.rejection_reason,
            documents_info: record.documents_info,
        }
    }
}
