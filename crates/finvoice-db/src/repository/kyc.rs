//! SurrealDB implementation of [`KycRepository`].
//!
//! The record key is the owner's id, so an owner can never hold more
//! than one KYC record and re-submission overwrites in place.

use chrono::{DateTime, Utc};
use finvoice_core::error::FinvoiceResult;
use finvoice_core::models::kyc::{KycRecord, KycStatus, UpsertKyc};
use finvoice_core::repository::KycRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct KycRow {
    kyc_id: String,
    owner_id: String,
    status: String,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewer_id: Option<String>,
    rejection_reason: Option<String>,
    documents_info: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl KycRow {
    fn try_into_record(self) -> Result<KycRecord, DbError> {
        let status = KycStatus::parse(&self.status)
            .ok_or_else(|| DbError::Decode(format!("unknown KYC status: {}", self.status)))?;
        Ok(KycRecord {
            id: parse_uuid("kyc", &self.kyc_id)?,
            owner_id: parse_uuid("owner", &self.owner_id)?,
            status,
            submitted_at: self.submitted_at,
            reviewed_at: self.reviewed_at,
            reviewer_id: parse_opt_uuid("reviewer", self.reviewer_id)?,
            rejection_reason: self.rejection_reason,
            documents_info: self.documents_info,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealKycRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealKycRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> KycRepository for SurrealKycRepository<C> {
    async fn upsert(&self, input: UpsertKyc) -> FinvoiceResult<KycRecord> {
        let owner_str = input.owner_id.to_string();

        let result = self
            .db
            .query(
                "UPSERT type::record('kyc_record', $owner_id) SET \
                 kyc_id = $kyc_id, owner_id = $owner_id, status = $status, \
                 submitted_at = $submitted_at, reviewed_at = $reviewed_at, \
                 reviewer_id = $reviewer_id, \
                 rejection_reason = $rejection_reason, \
                 documents_info = $documents_info, \
                 updated_at = time::now()",
            )
            .bind(("owner_id", owner_str.clone()))
            .bind(("kyc_id", input.id.to_string()))
            .bind(("status", input.status.as_str().to_string()))
            .bind(("submitted_at", input.submitted_at))
            .bind(("reviewed_at", input.reviewed_at))
            .bind(("reviewer_id", input.reviewer_id.map(|id| id.to_string())))
            .bind(("rejection_reason", input.rejection_reason))
            .bind(("documents_info", input.documents_info))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::write_failed("kyc_record", e))?;

        let rows: Vec<KycRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "kyc_record".into(),
            id: owner_str,
        })?;
        Ok(row.try_into_record()?)
    }

    async fn get_by_owner(&self, owner_id: Uuid) -> FinvoiceResult<KycRecord> {
        let owner_str = owner_id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('kyc_record', $owner_id)")
            .bind(("owner_id", owner_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<KycRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "kyc_record".into(),
            id: owner_str,
        })?;
        Ok(row.try_into_record()?)
    }
}
