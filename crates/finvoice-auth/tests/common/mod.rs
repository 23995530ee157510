//! Shared fixtures: in-memory SurrealDB repositories, the in-memory TTL
//! store and recording collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use finvoice_auth::{SessionConfig, SessionService, TokenConfig};
use finvoice_core::SideEffects;
use finvoice_core::error::{FinvoiceError, FinvoiceResult};
use finvoice_core::external::{Email, EventPublisher, KeyValueStore, Mailer};
use finvoice_db::repository::{
    SurrealAuditLogRepository, SurrealKycRepository, SurrealStaffRepository,
    SurrealUserRepository,
};
use finvoice_infra::MemoryKeyValueStore;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

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

    /// The six-digit code in the most recent message to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        let body = self.sent_to(to).last()?.body.clone();
        body.split(|c: char| !c.is_ascii_digit())
            .find(|run| run.len() == 6)
            .map(str::to_owned)
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
    pub published: Mutex<Vec<(String, String, serde_json::Value)>>,
    pub fail: AtomicBool,
}

impl RecordingEvents {
    pub fn routing_keys(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, rk, _)| rk.clone())
            .collect()
    }
}

impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> FinvoiceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FinvoiceError::Collaborator("broker unavailable".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((exchange.into(), routing_key.into(), payload));
        Ok(())
    }
}

/// In-memory TTL store whose reads can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryKeyValueStore,
    pub fail_reads: AtomicBool,
}

impl KeyValueStore for FlakyStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> FinvoiceResult<()> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> FinvoiceResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FinvoiceError::Collaborator("store unreachable".into()));
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> FinvoiceResult<()> {
        self.inner.delete(key).await
    }
}

pub type TestSessionService = SessionService<
    SurrealUserRepository<Db>,
    SurrealStaffRepository<Db>,
    SurrealKycRepository<Db>,
    FlakyStore,
    RecordingMailer,
    RecordingEvents,
    SurrealAuditLogRepository<Db>,
>;

pub struct Harness {
    pub db: Surreal<Db>,
    pub svc: TestSessionService,
    pub kv: Arc<FlakyStore>,
    pub mailer: Arc<RecordingMailer>,
    pub events: Arc<RecordingEvents>,
}

pub fn test_config() -> SessionConfig {
    SessionConfig::new(TokenConfig {
        secret: "test-secret-at-least-32-bytes-long!!".into(),
        issuer: "finvoice-test".into(),
        ..Default::default()
    })
}

/// Spin up in-memory DB, run migrations, wire the session service.
pub async fn setup() -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    finvoice_db::run_migrations(&db).await.unwrap();

    let kv = Arc::new(FlakyStore::default());
    let mailer = Arc::new(RecordingMailer::default());
    let events = Arc::new(RecordingEvents::default());
    let effects = SideEffects::new(
        Arc::clone(&mailer),
        Arc::clone(&events),
        Arc::new(SurrealAuditLogRepository::new(db.clone())),
    );

    let svc = SessionService::new(
        SurrealUserRepository::new(db.clone()),
        SurrealStaffRepository::new(db.clone()),
        SurrealKycRepository::new(db.clone()),
        Arc::clone(&kv),
        effects,
        test_config(),
    )
    .unwrap();

    Harness {
        db,
        svc,
        kv,
        mailer,
        events,
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
