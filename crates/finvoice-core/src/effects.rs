//! Detached dispatch of best-effort side effects.
//!
//! Emails, event publications and audit appends never block or fail the
//! operation that triggered them. Each one runs on its own task after the
//! primary write has been persisted; failures are logged and dropped.

use std::sync::Arc;

use tracing::warn;

use crate::external::{Email, EventPublisher, Mailer};
use crate::models::audit::CreateAuditLogEntry;
use crate::repository::AuditLogRepository;

pub struct SideEffects<M, P, A> {
    mailer: Arc<M>,
    events: Arc<P>,
    audit: Arc<A>,
}

impl<M, P, A> Clone for SideEffects<M, P, A> {
    fn clone(&self) -> Self {
        Self {
            mailer: Arc::clone(&self.mailer),
            events: Arc::clone(&self.events),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<M, P, A> SideEffects<M, P, A>
where
    M: Mailer + 'static,
    P: EventPublisher + 'static,
    A: AuditLogRepository + 'static,
{
    pub fn new(mailer: Arc<M>, events: Arc<P>, audit: Arc<A>) -> Self {
        Self {
            mailer,
            events,
            audit,
        }
    }

    pub fn email(&self, email: Email) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            let to = email.to.clone();
            let subject = email.subject.clone();
            if let Err(e) = mailer.send(email).await {
                warn!(%to, %subject, error = %e, "Failed to send email");
            }
        });
    }

    pub fn publish(
        &self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: serde_json::Value,
    ) {
        let events = Arc::clone(&self.events);
        let exchange = exchange.into();
        let routing_key = routing_key.into();
        tokio::spawn(async move {
            if let Err(e) = events.publish(&exchange, &routing_key, payload).await {
                warn!(%exchange, %routing_key, error = %e, "Failed to publish event");
            }
        });
    }

    pub fn audit(&self, entry: CreateAuditLogEntry) {
        let audit = Arc::clone(&self.audit);
        tokio::spawn(async move {
            let action = entry.action.clone();
            if let Err(e) = audit.append(entry).await {
                warn!(%action, error = %e, "Failed to append audit entry");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::error::{FinvoiceError, FinvoiceResult};
    use crate::models::audit::AuditLogEntry;
    use crate::repository::{AuditLogFilter, PaginatedResult, Pagination};

    #[derive(Default)]
    struct FailingMailer {
        attempts: Mutex<u32>,
    }

    impl Mailer for FailingMailer {
        async fn send(&self, _email: Email) -> FinvoiceResult<()> {
            *self.attempts.lock().unwrap() += 1;
            Err(FinvoiceError::Collaborator("smtp down".into()))
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        published: Mutex<Vec<(String, String)>>,
    }

    impl EventPublisher for RecordingEvents {
        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            _payload: serde_json::Value,
        ) -> FinvoiceResult<()> {
            self.published
                .lock()
                .unwrap()
                .push((exchange.to_string(), routing_key.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        actions: Mutex<Vec<String>>,
    }

    impl AuditLogRepository for RecordingAudit {
        async fn append(&self, input: CreateAuditLogEntry) -> FinvoiceResult<AuditLogEntry> {
            self.actions.lock().unwrap().push(input.action.clone());
            Ok(AuditLogEntry {
                id: Uuid::new_v4(),
                actor_id: input.actor_id,
                subject_id: input.subject_id,
                action: input.action,
                details: input.details,
                source_ip: input.source_ip,
                timestamp: Utc::now(),
            })
        }

        async fn list(
            &self,
            _filter: AuditLogFilter,
            pagination: Pagination,
        ) -> FinvoiceResult<PaginatedResult<AuditLogEntry>> {
            Ok(PaginatedResult {
                items: Vec::new(),
                total: 0,
                offset: pagination.offset,
                limit: pagination.limit,
            })
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn failing_mailer_does_not_affect_other_effects() {
        let mailer = Arc::new(FailingMailer::default());
        let events = Arc::new(RecordingEvents::default());
        let audit = Arc::new(RecordingAudit::default());
        let effects = SideEffects::new(mailer.clone(), events.clone(), audit.clone());

        effects.email(Email::new("a@x.com", "hello", "body"));
        effects.publish("exchange", "user.registered", serde_json::json!({}));
        effects.audit(CreateAuditLogEntry::new("USER_REGISTERED", serde_json::json!({})));
        settle().await;

        assert_eq!(*mailer.attempts.lock().unwrap(), 1);
        assert_eq!(
            events.published.lock().unwrap().as_slice(),
            &[("exchange".to_string(), "user.registered".to_string())]
        );
        assert_eq!(audit.actions.lock().unwrap().as_slice(), &["USER_REGISTERED"]);
    }
}
