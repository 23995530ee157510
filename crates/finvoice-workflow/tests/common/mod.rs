//! Shared fixtures: in-memory SurrealDB, a temporary blob root, a real
//! session service for registering owners, and recording collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use finvoice_auth::{RegisterUser, SessionConfig, SessionService, TokenConfig};
use finvoice_core::SideEffects;
use finvoice_core::error::{FinvoiceError, FinvoiceResult};
use finvoice_core::external::{Email, EventPublisher, Mailer};
use finvoice_core::models::account::{CreateStaff, CreateUser, UpdateUser, User};
use finvoice_core::models::invoice::{CreateInvoice, Invoice, InvoiceStatus};
use finvoice_core::models::ledger::{CreateLedgerTransaction, LedgerTransaction};
use finvoice_core::repository::{
    InvoiceRepository, PaginatedResult, Pagination, StaffRepository, UserRepository,
};
use finvoice_db::repository::{
    SurrealAuditLogRepository, SurrealInvoiceRepository, SurrealKycRepository,
    SurrealStaffRepository, SurrealUserRepository,
};
use finvoice_infra::{BlobConfig, LocalBlobStore, MemoryKeyValueStore};
use finvoice_workflow::{EventRoutes, InvoiceService, KycDecision, KycService, UploadedFile};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn sent_to(&self, to: &str) -> Vec<Email> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == to)
            .cloned()
            .collect()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> FinvoiceResult<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub published: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail: AtomicBool,
}

impl RecordingEvents {
    /// Payloads published under `routing_key`, oldest first.
    pub fn payloads(&self, routing_key: &str) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(rk, _)| rk == routing_key)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        _exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> FinvoiceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FinvoiceError::Collaborator("broker unavailable".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), payload));
        Ok(())
    }
}

type Audit = SurrealAuditLogRepository<Db>;

pub type TestSessionService = SessionService<
    SurrealUserRepository<Db>,
    SurrealStaffRepository<Db>,
    SurrealKycRepository<Db>,
    MemoryKeyValueStore,
    RecordingMailer,
    RecordingEvents,
    Audit,
>;

pub type TestKycService = KycService<
    SurrealUserRepository<Db>,
    SurrealStaffRepository<Db>,
    SurrealKycRepository<Db>,
    RecordingMailer,
    RecordingEvents,
    Audit,
>;

pub type TestInvoiceService = InvoiceService<
    SurrealInvoiceRepository<Db>,
    SurrealUserRepository<Db>,
    SurrealKycRepository<Db>,
    LocalBlobStore,
    RecordingMailer,
    RecordingEvents,
    Audit,
>;

pub const MAX_FILE_SIZE: u64 = 64 * 1024;

/// Invoice store whose inserts always fail; everything else is real.
pub struct RefusingInserts(pub SurrealInvoiceRepository<Db>);

impl InvoiceRepository for RefusingInserts {
    async fn create(&self, _input: CreateInvoice) -> FinvoiceResult<Invoice> {
        Err(FinvoiceError::Database("connection reset".into()))
    }

    async fn get_by_id(&self, id: Uuid) -> FinvoiceResult<Invoice> {
        self.0.get_by_id(id).await
    }

    async fn save(&self, invoice: &Invoice, expected_status: InvoiceStatus) -> FinvoiceResult<Invoice> {
        self.0.save(invoice, expected_status).await
    }

    async fn save_with_ledger_entry(
        &self,
        invoice: &Invoice,
        expected_status: InvoiceStatus,
        ledger_entry: CreateLedgerTransaction,
    ) -> FinvoiceResult<(Invoice, LedgerTransaction)> {
        self.0
            .save_with_ledger_entry(invoice, expected_status, ledger_entry)
            .await
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> FinvoiceResult<PaginatedResult<Invoice>> {
        self.0.list_by_owner(owner_id, pagination).await
    }

    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> FinvoiceResult<PaginatedResult<Invoice>> {
        self.0.list(status, pagination).await
    }
}

/// User store whose id lookups never complete.
pub struct StalledLookups(pub SurrealUserRepository<Db>);

impl UserRepository for StalledLookups {
    async fn create(&self, input: CreateUser) -> FinvoiceResult<User> {
        self.0.create(input).await
    }

    async fn get_by_id(&self, _id: Uuid) -> FinvoiceResult<User> {
        std::future::pending().await
    }

    async fn get_by_email(&self, email: &str) -> FinvoiceResult<User> {
        self.0.get_by_email(email).await
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> FinvoiceResult<User> {
        self.0.update(id, input).await
    }
}

pub struct Harness {
    pub db: Surreal<Db>,
    pub session: TestSessionService,
    pub kyc: TestKycService,
    pub invoices: TestInvoiceService,
    pub blob: Arc<LocalBlobStore>,
    pub mailer: Arc<RecordingMailer>,
    pub events: Arc<RecordingEvents>,
    pub staff_id: Uuid,
    /// Keeps the blob root alive for the duration of the test.
    pub blob_dir: tempfile::TempDir,
}

impl Harness {
    /// An invoice service over the harness' database, blob root and
    /// recorders, with the invoice and user stores swapped out.
    pub fn invoices_with<I, U>(
        &self,
        invoices: I,
        users: U,
    ) -> InvoiceService<I, U, SurrealKycRepository<Db>, LocalBlobStore, RecordingMailer, RecordingEvents, Audit>
    where
        I: InvoiceRepository,
        U: UserRepository + 'static,
    {
        InvoiceService::new(
            invoices,
            users,
            SurrealKycRepository::new(self.db.clone()),
            Arc::clone(&self.blob),
            SideEffects::new(
                Arc::clone(&self.mailer),
                Arc::clone(&self.events),
                Arc::new(SurrealAuditLogRepository::new(self.db.clone())),
            ),
            EventRoutes::default(),
        )
    }

    pub async fn register(&self, email: &str) -> User {
        self.session
            .register(RegisterUser {
                email: email.into(),
                password: "pw12345678".into(),
                first_name: "Alice".into(),
                last_name: "Anders".into(),
                company_name: "Acme Trading".into(),
            })
            .await
            .unwrap()
    }

    /// A registered owner whose KYC has been approved by staff.
    pub async fn approved_owner(&self, email: &str) -> User {
        let user = self.register(email).await;
        self.kyc
            .review(user.id, self.staff_id, KycDecision::Approved, None)
            .await
            .unwrap();
        user
    }
}

pub fn pdf(name: &str) -> UploadedFile {
    UploadedFile {
        file_name: name.into(),
        content: b"%PDF-1.4 test document".to_vec(),
    }
}

pub async fn setup() -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    finvoice_db::run_migrations(&db).await.unwrap();

    let mailer = Arc::new(RecordingMailer::default());
    let events = Arc::new(RecordingEvents::default());
    let effects = SideEffects::new(
        Arc::clone(&mailer),
        Arc::clone(&events),
        Arc::new(SurrealAuditLogRepository::new(db.clone())),
    );

    let session = SessionService::new(
        SurrealUserRepository::new(db.clone()),
        SurrealStaffRepository::new(db.clone()),
        SurrealKycRepository::new(db.clone()),
        Arc::new(MemoryKeyValueStore::new()),
        effects.clone(),
        SessionConfig::new(TokenConfig {
            secret: "test-secret-at-least-32-bytes-long!!".into(),
            ..Default::default()
        }),
    )
    .unwrap();

    let staff = SurrealStaffRepository::new(db.clone())
        .create(CreateStaff {
            email: "reviewer@fin.com".into(),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            password_hash: session.vault().hash("staff-pass-1").unwrap(),
            position: "analyst".into(),
        })
        .await
        .unwrap();

    let kyc = KycService::new(
        SurrealUserRepository::new(db.clone()),
        SurrealStaffRepository::new(db.clone()),
        SurrealKycRepository::new(db.clone()),
        effects.clone(),
        EventRoutes::default(),
    );

    let blob_dir = tempfile::tempdir().unwrap();
    let blob = Arc::new(LocalBlobStore::new(BlobConfig {
        root: blob_dir.path().to_path_buf(),
        max_file_size_bytes: MAX_FILE_SIZE,
    }));
    let invoices = InvoiceService::new(
        SurrealInvoiceRepository::new(db.clone()),
        SurrealUserRepository::new(db.clone()),
        SurrealKycRepository::new(db.clone()),
        Arc::clone(&blob),
        effects,
        EventRoutes::default(),
    );

    Harness {
        db,
        session,
        kyc,
        invoices,
        blob,
        mailer,
        events,
        staff_id: staff.id,
        blob_dir,
    }
}

/// Poll `condition` until it holds, giving detached side effects time
/// to run.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
