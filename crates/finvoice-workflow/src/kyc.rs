//! KYC lifecycle: owner submission, staff review, and the approval gate
//! that guards invoice upload.
//!
//! ```text
//! pending -> approved | rejected | resubmit_required   (staff review)
//! any     -> pending                                   (owner submits)
//! ```

use chrono::Utc;
use finvoice_core::SideEffects;
use finvoice_core::error::FinvoiceError;
use finvoice_core::external::{Email, EventPublisher, Mailer};
use finvoice_core::models::audit::CreateAuditLogEntry;
use finvoice_core::models::kyc::{KycRecord, KycStatus, UpsertKyc};
use finvoice_core::repository::{
    AuditLogRepository, KycRepository, StaffRepository, UserRepository,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::EventRoutes;
use crate::error::{WorkflowError, WorkflowResult};

/// Outcome a reviewer may record. Returning a record to `pending` is
/// the owner's move, not the reviewer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycDecision {
    Approved,
    Rejected,
    ResubmitRequired,
}

impl KycDecision {
    pub fn status(self) -> KycStatus {
        match self {
            KycDecision::Approved => KycStatus::Approved,
            KycDecision::Rejected => KycStatus::Rejected,
            KycDecision::ResubmitRequired => KycStatus::ResubmitRequired,
        }
    }
}

/// Fail with `KycNotApproved` unless the owner's record is approved.
/// An owner without a record has not been approved either.
pub async fn ensure_approved<C: KycRepository>(kyc: &C, owner_id: Uuid) -> WorkflowResult<()> {
    match kyc.get_by_owner(owner_id).await {
        Ok(record) if record.status == KycStatus::Approved => Ok(()),
        Ok(_) => Err(WorkflowError::KycNotApproved),
        Err(FinvoiceError::NotFound { .. }) => Err(WorkflowError::KycNotApproved),
        Err(e) => Err(e.into()),
    }
}

pub struct KycService<U, S, C, M, P, A> {
    users: U,
    staff: S,
    kyc: C,
    effects: SideEffects<M, P, A>,
    routes: EventRoutes,
}

impl<U, S, C, M, P, A> KycService<U, S, C, M, P, A>
where
    U: UserRepository,
    S: StaffRepository,
    C: KycRepository,
    M: Mailer + 'static,
    P: EventPublisher + 'static,
    A: AuditLogRepository + 'static,
{
    pub fn new(
        users: U,
        staff: S,
        kyc: C,
        effects: SideEffects<M, P, A>,
        routes: EventRoutes,
    ) -> Self {
        Self {
            users,
            staff,
            kyc,
            effects,
            routes,
        }
    }

    /// Submit (or resubmit) verification documents. Always returns the
    /// record to `pending` and clears any earlier review.
    pub async fn submit(
        &self,
        owner_id: Uuid,
        documents_info: serde_json::Value,
    ) -> WorkflowResult<KycRecord> {
        self.users.get_by_id(owner_id).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::AccountNotFound(owner_id),
            other => other.into(),
        })?;

        let id = match self.kyc.get_by_owner(owner_id).await {
            Ok(existing) => existing.id,
            Err(FinvoiceError::NotFound { .. }) => Uuid::new_v4(),
            Err(e) => return Err(e.into()),
        };

        let record = self
            .kyc
            .upsert(UpsertKyc {
                id,
                owner_id,
                status: KycStatus::Pending,
                submitted_at: Some(Utc::now()),
                reviewed_at: None,
                reviewer_id: None,
                rejection_reason: None,
                documents_info,
            })
            .await?;

        self.effects.audit(
            CreateAuditLogEntry::new("KYC_SUBMITTED", json!({ "kyc_id": record.id }))
                .actor(owner_id)
                .subject(owner_id),
        );
        info!(%owner_id, kyc_id = %record.id, "KYC submitted");
        Ok(record)
    }

    /// Record a staff decision on an owner's KYC record.
    ///
    /// A rejection needs a non-blank reason. The reason is kept for
    /// `resubmit_required` and cleared on approval. The reviewer must be
    /// a known staff account.
    pub async fn review(
        &self,
        owner_id: Uuid,
        reviewer_id: Uuid,
        decision: KycDecision,
        reason: Option<String>,
    ) -> WorkflowResult<KycRecord> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if decision == KycDecision::Rejected && reason.is_none() {
            return Err(WorkflowError::RejectionReasonRequired);
        }

        let owner = self.users.get_by_id(owner_id).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::AccountNotFound(owner_id),
            other => other.into(),
        })?;
        let current = self.kyc.get_by_owner(owner_id).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::KycNotFound(owner_id),
            other => other.into(),
        })?;
        self.staff.get_by_id(reviewer_id).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::AccountNotFound(reviewer_id),
            other => other.into(),
        })?;
        let old_status = current.status;

        let mut next = UpsertKyc::from(current);
        next.status = decision.status();
        next.reviewed_at = Some(Utc::now());
        next.reviewer_id = Some(reviewer_id);
        next.rejection_reason = match decision {
            KycDecision::Approved => None,
            KycDecision::Rejected | KycDecision::ResubmitRequired => reason,
        };
        let record = self.kyc.upsert(next).await?;

        self.effects.audit(
            CreateAuditLogEntry::new(
                "ADMIN_KYC_REVIEWED",
                json!({
                    "kyc_id": record.id,
                    "old_status": old_status,
                    "new_status": record.status,
                    "reason": record.rejection_reason,
                }),
            )
            .actor(reviewer_id)
            .subject(owner_id),
        );

        let mut body = format!(
            "Dear {},\n\nYour KYC application status has been updated to: {}.",
            owner.first_name, record.status
        );
        if let Some(reason) = &record.rejection_reason {
            body.push_str(&format!("\nReason: {reason}"));
        }
        body.push_str("\n\nPlease log in to your account for more details.");
        self.effects.email(Email::new(
            &owner.email,
            format!("Your KYC Application Status: {}", record.status),
            body,
        ));

        let mut payload = json!({
            "user_id": owner_id,
            "kyc_id": record.id,
            "status": record.status,
        });
        if let Some(reason) = &record.rejection_reason {
            payload["rejection_reason"] = json!(reason);
        }
        self.effects
            .publish(&self.routes.exchange, &self.routes.kyc_status_updated, payload);

        info!(%owner_id, %reviewer_id, status = %record.status, "KYC reviewed");
        Ok(record)
    }

    pub async fn status(&self, owner_id: Uuid) -> WorkflowResult<KycRecord> {
        self.kyc.get_by_owner(owner_id).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::KycNotFound(owner_id),
            other => other.into(),
        })
    }

    pub async fn ensure_approved(&self, owner_id: Uuid) -> WorkflowResult<()> {
        ensure_approved(&self.kyc, owner_id).await
    }
}
