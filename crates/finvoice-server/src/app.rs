//! Service graph for one process.

use std::sync::Arc;
use std::time::Duration;

use finvoice_auth::SessionService;
use finvoice_core::SideEffects;
use finvoice_db::DbManager;
use finvoice_db::repository::{
    SurrealAuditLogRepository, SurrealInvoiceRepository, SurrealKeyValueStore,
    SurrealKycRepository, SurrealStaffRepository, SurrealUserRepository,
};
use finvoice_events::{AmqpBroker, PublisherHandle, spawn_publisher};
use finvoice_infra::{LocalBlobStore, OutboundMailer};
use finvoice_workflow::{InvoiceService, KycService};
use surrealdb::engine::any::Any;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;

type Audit = SurrealAuditLogRepository<Any>;

pub type Sessions = SessionService<
    SurrealUserRepository<Any>,
    SurrealStaffRepository<Any>,
    SurrealKycRepository<Any>,
    SurrealKeyValueStore<Any>,
    OutboundMailer,
    PublisherHandle,
    Audit,
>;

pub type Kyc = KycService<
    SurrealUserRepository<Any>,
    SurrealStaffRepository<Any>,
    SurrealKycRepository<Any>,
    OutboundMailer,
    PublisherHandle,
    Audit,
>;

pub type Invoices = InvoiceService<
    SurrealInvoiceRepository<Any>,
    SurrealUserRepository<Any>,
    SurrealKycRepository<Any>,
    LocalBlobStore,
    OutboundMailer,
    PublisherHandle,
    Audit,
>;

/// Services handed to the request boundary, plus the background tasks
/// they depend on.
#[allow(dead_code)]
pub struct App {
    pub sessions: Sessions,
    pub kyc: Kyc,
    pub invoices: Invoices,
    publisher: PublisherHandle,
    purge: JoinHandle<()>,
}

impl App {
    pub async fn build(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = DbManager::connect(&config.db).await?;
        let client = db.client().clone();

        let publisher = spawn_publisher(
            AmqpBroker::new(&config.amqp_url, &config.routes.exchange),
            config.publisher.clone(),
        );
        let mailer = OutboundMailer::from_config(config.smtp.clone())?;
        if !mailer.delivers() {
            warn!("No SMTP relay configured; outgoing email is logged, not sent");
        }
        let effects = SideEffects::new(
            Arc::new(mailer),
            Arc::new(publisher.clone()),
            Arc::new(SurrealAuditLogRepository::new(client.clone())),
        );

        let kv = Arc::new(SurrealKeyValueStore::new(client.clone()));
        let purge = spawn_kv_purge(Arc::clone(&kv), config.kv_purge_interval);

        let sessions = SessionService::new(
            SurrealUserRepository::new(client.clone()),
            SurrealStaffRepository::new(client.clone()),
            SurrealKycRepository::new(client.clone()),
            kv,
            effects.clone(),
            config.session,
        )?;

        let kyc = KycService::new(
            SurrealUserRepository::new(client.clone()),
            SurrealStaffRepository::new(client.clone()),
            SurrealKycRepository::new(client.clone()),
            effects.clone(),
            config.routes.clone(),
        );

        tokio::fs::create_dir_all(&config.blob.root).await?;
        let invoices = InvoiceService::new(
            SurrealInvoiceRepository::new(client.clone()),
            SurrealUserRepository::new(client.clone()),
            SurrealKycRepository::new(client),
            Arc::new(LocalBlobStore::new(config.blob)),
            effects,
            config.routes,
        );

        Ok(Self {
            sessions,
            kyc,
            invoices,
            publisher,
            purge,
        })
    }

    pub async fn shutdown(self) {
        self.purge.abort();
        self.publisher.close().await;
        info!("Services stopped");
    }
}

fn spawn_kv_purge(kv: Arc<SurrealKeyValueStore<Any>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = kv.purge_expired().await {
                warn!(error = %e, "Failed to purge expired key-value entries");
            }
        }
    })
}
