//! Invoice lifecycle: KYC-gated upload, staff status transitions with
//! ledger posting, receipts, owner-scoped reads and document-processor
//! updates.
//!
//! Every write is conditional on the copy the service read, so of two
//! writers racing on the same invoice only one wins; the loser gets
//! `ConcurrentModification`. Notifications, events and audit entries
//! are dispatched after the write and never roll it back or delay it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use finvoice_core::SideEffects;
use finvoice_core::error::FinvoiceError;
use finvoice_core::external::{Attachment, BlobStore, Email, EventPublisher, Mailer};
use finvoice_core::models::account::User;
use finvoice_core::models::audit::CreateAuditLogEntry;
use finvoice_core::models::invoice::{CreateInvoice, Invoice, InvoiceStatus};
use finvoice_core::models::ledger::{CreateLedgerTransaction, TransactionType};
use finvoice_core::repository::{
    AuditLogRepository, InvoiceRepository, KycRepository, PaginatedResult, Pagination,
    UserRepository,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EventRoutes;
use crate::error::{WorkflowError, WorkflowResult};
use crate::{kyc, transition};

const INVOICE_FOLDER: &str = "invoices";
const RECEIPT_FOLDER: &str = "receipts/disbursements";

/// Placeholder until the document processor extracts the real currency.
const DEFAULT_CURRENCY: &str = "USD";

/// A file received at the boundary.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Owner-declared invoice upload. Fields left empty are filled in
/// later by the document processor.
#[derive(Debug, Clone)]
pub struct InvoiceUpload {
    pub file: UploadedFile,
    pub invoice_number: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl From<UploadedFile> for InvoiceUpload {
    fn from(file: UploadedFile) -> Self {
        Self {
            file,
            invoice_number: None,
            amount: None,
            currency: None,
            due_date: None,
        }
    }
}

/// A staff request to move an invoice to `status`.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: InvoiceStatus,
    pub rejection_reason: Option<String>,
    pub financed_amount: Option<Decimal>,
    pub financing_fee_percentage: Option<Decimal>,
}

impl StatusUpdate {
    pub fn to(status: InvoiceStatus) -> Self {
        Self {
            status,
            rejection_reason: None,
            financed_amount: None,
            financing_fee_percentage: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            rejection_reason: Some(reason.into()),
            ..Self::to(InvoiceStatus::Rejected)
        }
    }

    pub fn disbursed(financed_amount: Decimal, financing_fee_percentage: Decimal) -> Self {
        Self {
            financed_amount: Some(financed_amount),
            financing_fee_percentage: Some(financing_fee_percentage),
            ..Self::to(InvoiceStatus::Disbursed)
        }
    }
}

/// Fields extracted from an uploaded document. `None` leaves the stored
/// value untouched.
#[derive(Debug, Clone, Default)]
pub struct ExtractedInvoiceData {
    pub invoice_number: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    /// `YYYY-MM-DD`; unparseable values are logged and ignored.
    pub due_date: Option<String>,
    pub debtor_name: Option<String>,
    pub issuer_name: Option<String>,
}

pub struct InvoiceService<I, U, C, B, M, P, A> {
    invoices: I,
    users: Arc<U>,
    kyc: C,
    blob: Arc<B>,
    effects: SideEffects<M, P, A>,
    routes: EventRoutes,
}

impl<I, U, C, B, M, P, A> InvoiceService<I, U, C, B, M, P, A>
where
    I: InvoiceRepository,
    U: UserRepository + 'static,
    C: KycRepository,
    B: BlobStore + 'static,
    M: Mailer + 'static,
    P: EventPublisher + 'static,
    A: AuditLogRepository + 'static,
{
    pub fn new(
        invoices: I,
        users: U,
        kyc: C,
        blob: Arc<B>,
        effects: SideEffects<M, P, A>,
        routes: EventRoutes,
    ) -> Self {
        Self {
            invoices,
            users: Arc::new(users),
            kyc,
            blob,
            effects,
            routes,
        }
    }

    /// Store an invoice document and open it for review. The owner's
    /// KYC must be approved; nothing is written otherwise. The stored
    /// document is removed again if the invoice row cannot be created.
    pub async fn upload(&self, owner_id: Uuid, upload: InvoiceUpload) -> WorkflowResult<Invoice> {
        let owner = self.owner(owner_id).await?;
        kyc::ensure_approved(&self.kyc, owner_id).await?;
        self.check_size(&upload.file)?;

        let stored = self
            .blob
            .save(&upload.file.content, &upload.file.file_name, INVOICE_FOLDER)
            .await
            .map_err(WorkflowError::from_blob)?;

        let created = self
            .invoices
            .create(CreateInvoice {
                owner_id,
                invoice_number: upload.invoice_number,
                amount: upload.amount.unwrap_or(Decimal::ZERO),
                currency: upload
                    .currency
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                due_date: upload.due_date,
                original_file_path: stored.relative_path.clone(),
            })
            .await;
        let invoice = match created {
            Ok(invoice) => invoice,
            Err(e) => {
                self.discard_blob(&stored.relative_path).await;
                return Err(e.into());
            }
        };

        self.effects.publish(
            &self.routes.exchange,
            &self.routes.invoice_uploaded,
            json!({
                "invoice_id": invoice.id,
                "user_id": owner_id,
                "user_email": owner.email,
                "company_name": owner.company_name,
                "file_path": stored.relative_path,
                "original_filename": upload.file.file_name,
            }),
        );
        self.effects.email(Email::new(
            &owner.email,
            "Invoice received",
            format!(
                "Dear {},\n\nWe have received your invoice \"{}\" and it is now pending review.",
                owner.first_name, upload.file.file_name
            ),
        ));
        self.effects.audit(
            CreateAuditLogEntry::new(
                "INVOICE_UPLOADED",
                json!({ "invoice_id": invoice.id, "filename": upload.file.file_name }),
            )
            .actor(owner_id)
            .subject(owner_id),
        );

        info!(%owner_id, invoice_id = %invoice.id, "Invoice uploaded");
        Ok(invoice)
    }

    /// Apply a staff status transition. Disbursement posts its ledger
    /// entry in the same atomic write as the status change.
    pub async fn update_status(
        &self,
        invoice_id: Uuid,
        staff_id: Uuid,
        update: StatusUpdate,
    ) -> WorkflowResult<Invoice> {
        let current = self.load(invoice_id).await?;
        let from = current.status;
        transition::check(from, update.status)?;

        let now = Utc::now();
        let mut next = current;
        next.status = update.status;
        let mut details = json!({
            "invoice_id": invoice_id,
            "old_status": from,
            "new_status": update.status,
            "admin_staff_id": staff_id,
        });
        let mut ledger_entry = None;

        match update.status {
            InvoiceStatus::Approved => {
                next.approved_by_id = Some(staff_id);
                next.approved_at = Some(now);
            }
            InvoiceStatus::Rejected => {
                let reason = non_blank(update.rejection_reason)
                    .ok_or(WorkflowError::RejectionReasonRequired)?;
                // The reviewer is stamped for either outcome.
                next.approved_by_id = Some(staff_id);
                next.approved_at = Some(now);
                details["rejection_reason"] = json!(reason);
                next.rejection_reason = Some(reason);
            }
            InvoiceStatus::Disbursed => {
                let (financed, fee) =
                    disbursement_terms(update.financed_amount, update.financing_fee_percentage)?;
                next.disbursed_by_id = Some(staff_id);
                next.disbursed_at = Some(now);
                next.financed_amount = Some(financed);
                next.financing_fee_percentage = Some(fee);
                details["financed_amount"] = json!(financed);
                details["financing_fee_percentage"] = json!(fee);
                ledger_entry = Some(CreateLedgerTransaction {
                    invoice_id,
                    kind: TransactionType::Disbursement,
                    amount: financed,
                    occurred_at: now,
                    reference_id: None,
                });
            }
            InvoiceStatus::Repaid => {
                details["repayment_confirmed_by_staff_id"] = json!(staff_id);
            }
            InvoiceStatus::RepaymentPending | InvoiceStatus::PendingReview => {}
        }

        let saved = match ledger_entry {
            Some(entry) => {
                let (invoice, tx) = self
                    .invoices
                    .save_with_ledger_entry(&next, from, entry)
                    .await
                    .map_err(|e| WorkflowError::from_invoice_store(invoice_id, e))?;
                details["disbursement_transaction_id"] = json!(tx.id);
                invoice
            }
            None => self
                .invoices
                .save(&next, from)
                .await
                .map_err(|e| WorkflowError::from_invoice_store(invoice_id, e))?,
        };

        self.effects.audit(
            CreateAuditLogEntry::new("ADMIN_INVOICE_STATUS_UPDATE", details)
                .actor(staff_id)
                .subject(saved.owner_id),
        );
        self.notify_status_change(saved.clone(), from);

        let mut payload = json!({
            "invoice_id": saved.id,
            "user_id": saved.owner_id,
            "old_status": from,
            "status": saved.status,
        });
        if saved.status == InvoiceStatus::Rejected {
            payload["rejection_reason"] = json!(saved.rejection_reason);
        }
        self.effects.publish(
            &self.routes.exchange,
            &self.routes.invoice_status_updated,
            payload,
        );

        info!(%invoice_id, %staff_id, from = %from, to = %saved.status, "Invoice status updated");
        Ok(saved)
    }

    /// Store a disbursement receipt and mail it to the owner. The mail
    /// falls back to a plain notice when the stored file cannot be
    /// resolved for attachment.
    pub async fn attach_receipt(
        &self,
        invoice_id: Uuid,
        staff_id: Uuid,
        file: UploadedFile,
    ) -> WorkflowResult<Invoice> {
        let current = self.load(invoice_id).await?;
        self.check_size(&file)?;

        let stored = self
            .blob
            .save(&file.content, &file.file_name, RECEIPT_FOLDER)
            .await
            .map_err(WorkflowError::from_blob)?;

        let expected = current.status;
        let mut next = current;
        next.receipt_path = Some(stored.relative_path.clone());
        let saved = match self.invoices.save(&next, expected).await {
            Ok(saved) => saved,
            Err(e) => {
                self.discard_blob(&stored.relative_path).await;
                return Err(WorkflowError::from_invoice_store(invoice_id, e));
            }
        };

        self.effects.audit(
            CreateAuditLogEntry::new(
                "ADMIN_RECEIPT_UPLOADED",
                json!({
                    "invoice_id": invoice_id,
                    "receipt_path": stored.relative_path,
                    "file_name": stored.generated_name,
                }),
            )
            .actor(staff_id)
            .subject(saved.owner_id),
        );

        let users = Arc::clone(&self.users);
        let blob = Arc::clone(&self.blob);
        let effects = self.effects.clone();
        let invoice = saved.clone();
        tokio::spawn(async move {
            let owner = match users.get_by_id(invoice.owner_id).await {
                Ok(owner) => owner,
                Err(e) => {
                    warn!(invoice_id = %invoice.id, error = %e, "Invoice owner not found, skipping receipt email");
                    return;
                }
            };
            let email = Email::new(
                &owner.email,
                format!("Disbursement Receipt Uploaded for Invoice #{}", label(&invoice)),
                format!(
                    "Dear {},\n\nA disbursement receipt has been uploaded for your invoice #{} \
                     (Amount: {:.2} {}). You can view or download it from your dashboard.",
                    owner.first_name,
                    label(&invoice),
                    invoice.amount,
                    invoice.currency
                ),
            );
            let email = match blob.resolve(&stored.relative_path).await {
                Ok(path) => email.with_attachment(Attachment {
                    path,
                    file_name: stored.generated_name,
                }),
                Err(e) => {
                    warn!(
                        receipt = %stored.relative_path,
                        error = %e,
                        "Receipt not resolvable, sending notice without attachment"
                    );
                    email
                }
            };
            effects.email(email);
        });

        info!(%invoice_id, %staff_id, "Disbursement receipt attached");
        Ok(saved)
    }

    /// Fetch an invoice on behalf of its owner.
    pub async fn get_for_owner(&self, invoice_id: Uuid, owner_id: Uuid) -> WorkflowResult<Invoice> {
        let invoice = self.load(invoice_id).await?;
        if invoice.owner_id != owner_id {
            return Err(WorkflowError::AccessDenied);
        }
        Ok(invoice)
    }

    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> WorkflowResult<PaginatedResult<Invoice>> {
        Ok(self.invoices.list_by_owner(owner_id, pagination).await?)
    }

    /// Staff read; no ownership check.
    pub async fn get(&self, invoice_id: Uuid) -> WorkflowResult<Invoice> {
        self.load(invoice_id).await
    }

    /// Staff listing, optionally restricted to one status.
    pub async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> WorkflowResult<PaginatedResult<Invoice>> {
        Ok(self.invoices.list(status, pagination).await?)
    }

    /// Absolute path and file name of the owner's disbursement receipt.
    pub async fn receipt_for_owner(
        &self,
        invoice_id: Uuid,
        owner_id: Uuid,
    ) -> WorkflowResult<(PathBuf, String)> {
        let invoice = self.get_for_owner(invoice_id, owner_id).await?;
        let relative = invoice
            .receipt_path
            .filter(|p| !p.is_empty())
            .ok_or(WorkflowError::ReceiptNotFound(invoice_id))?;

        let path = self.blob.resolve(&relative).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::ReceiptNotFound(invoice_id),
            other => WorkflowError::from_blob(other),
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.clone());
        Ok((path, file_name))
    }

    /// Apply document-processor output. The status is left unchanged.
    pub async fn record_extracted_data(
        &self,
        invoice_id: Uuid,
        data: ExtractedInvoiceData,
    ) -> WorkflowResult<Invoice> {
        let current = self.load(invoice_id).await?;
        let expected = current.status;
        let mut next = current;

        if let Some(number) = data.invoice_number {
            next.invoice_number = Some(number);
        }
        if let Some(amount) = data.amount {
            next.amount = amount;
        }
        if let Some(currency) = data.currency {
            next.currency = currency;
        }
        if let Some(debtor) = data.debtor_name {
            next.debtor_name = Some(debtor);
        }
        if let Some(issuer) = data.issuer_name {
            next.issuer_name = Some(issuer);
        }
        if let Some(raw) = data.due_date.filter(|d| !d.is_empty()) {
            match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => next.due_date = Some(date),
                Err(e) => {
                    warn!(%invoice_id, due_date = %raw, error = %e, "Ignoring unparseable due date");
                }
            }
        }

        let saved = self
            .invoices
            .save(&next, expected)
            .await
            .map_err(|e| WorkflowError::from_invoice_store(invoice_id, e))?;

        self.effects.audit(
            CreateAuditLogEntry::new(
                "INVOICE_DATA_PROCESSED",
                json!({ "invoice_id": invoice_id, "source": "document_processor" }),
            )
            .subject(saved.owner_id),
        );
        Ok(saved)
    }

    async fn load(&self, invoice_id: Uuid) -> WorkflowResult<Invoice> {
        self.invoices
            .get_by_id(invoice_id)
            .await
            .map_err(|e| WorkflowError::from_invoice_store(invoice_id, e))
    }

    async fn owner(&self, owner_id: Uuid) -> WorkflowResult<User> {
        self.users.get_by_id(owner_id).await.map_err(|e| match e {
            FinvoiceError::NotFound { .. } => WorkflowError::AccountNotFound(owner_id),
            other => other.into(),
        })
    }

    fn check_size(&self, file: &UploadedFile) -> WorkflowResult<()> {
        let max_bytes = self.blob.max_file_size();
        if file.content.len() as u64 > max_bytes {
            return Err(WorkflowError::FileTooLarge { max_bytes });
        }
        Ok(())
    }

    /// Email the owner about a transition. The owner lookup runs on the
    /// spawned task, off the caller's path.
    fn notify_status_change(&self, invoice: Invoice, from: InvoiceStatus) {
        let users = Arc::clone(&self.users);
        let effects = self.effects.clone();
        tokio::spawn(async move {
            let owner = match users.get_by_id(invoice.owner_id).await {
                Ok(owner) => owner,
                Err(e) => {
                    warn!(invoice_id = %invoice.id, error = %e, "Invoice owner not found, skipping status email");
                    return;
                }
            };

            let mut body = format!(
                "Dear {},\n\nYour invoice #{} (Amount: {:.2} {}) has been updated from {} to: {}.",
                owner.first_name,
                label(&invoice),
                invoice.amount,
                invoice.currency,
                from,
                invoice.status
            );
            if invoice.status == InvoiceStatus::Rejected {
                if let Some(reason) = &invoice.rejection_reason {
                    body.push_str(&format!("\nReason: {reason}"));
                }
            }
            if invoice.status == InvoiceStatus::Disbursed {
                if let Some(financed) = invoice.financed_amount {
                    body.push_str(&format!(
                        "\nFinanced Amount: {financed:.2} {}.",
                        invoice.currency
                    ));
                }
            }
            body.push_str("\n\nPlease log in to your account for more details.");

            effects.email(Email::new(
                &owner.email,
                format!("Invoice #{} Status Update: {}", label(&invoice), invoice.status),
                body,
            ));
        });
    }

    async fn discard_blob(&self, relative_path: &str) {
        if let Err(e) = self.blob.delete(relative_path).await {
            warn!(blob = %relative_path, error = %e, "Failed to remove orphaned blob");
        }
    }
}

fn label(invoice: &Invoice) -> String {
    invoice
        .invoice_number
        .clone()
        .unwrap_or_else(|| invoice.id.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Disbursement needs a positive financed amount and a non-negative fee.
fn disbursement_terms(
    financed_amount: Option<Decimal>,
    fee_percentage: Option<Decimal>,
) -> WorkflowResult<(Decimal, Decimal)> {
    let financed = financed_amount
        .filter(|a| *a > Decimal::ZERO)
        .ok_or_else(|| {
            WorkflowError::InvalidDisbursementTerms("financed amount must be positive".into())
        })?;
    let fee = fee_percentage
        .filter(|f| *f >= Decimal::ZERO)
        .ok_or_else(|| {
            WorkflowError::InvalidDisbursementTerms(
                "financing fee percentage must not be negative".into(),
            )
        })?;
    Ok((financed, fee))
}
