//! Integration tests for the audit log and the TTL key-value table.

use std::time::Duration;

use finvoice_core::external::KeyValueStore;
use finvoice_core::models::audit::CreateAuditLogEntry;
use finvoice_core::repository::{AuditLogFilter, AuditLogRepository, Pagination};
use finvoice_db::repository::{SurrealAuditLogRepository, SurrealKeyValueStore};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    finvoice_db::run_migrations(&db).await.unwrap();
    db
}

#[tokio::test]
async fn audit_append_and_filter() {
    let repo = SurrealAuditLogRepository::new(setup().await);
    let staff = Uuid::new_v4();
    let user = Uuid::new_v4();

    let entry = repo
        .append(
            CreateAuditLogEntry::new("ADMIN_KYC_REVIEWED", json!({ "decision": "approved" }))
                .actor(staff)
                .subject(user),
        )
        .await
        .unwrap();
    assert_eq!(entry.actor_id, Some(staff));
    assert_eq!(entry.details["decision"], "approved");

    repo.append(CreateAuditLogEntry::new("USER_LOGIN", json!({})).actor(user))
        .await
        .unwrap();

    let all = repo
        .list(AuditLogFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let by_staff = repo
        .list(
            AuditLogFilter {
                actor_id: Some(staff),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_staff.total, 1);
    assert_eq!(by_staff.items[0].action, "ADMIN_KYC_REVIEWED");

    let logins = repo
        .list(
            AuditLogFilter {
                action: Some("USER_LOGIN".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(logins.items.len(), 1);
    assert!(logins.items[0].subject_id.is_none());
}

#[tokio::test]
async fn kv_set_get_delete() {
    let store = SurrealKeyValueStore::new(setup().await);

    store
        .set_with_ttl("otp:abc", "123456", Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(store.get("otp:abc").await.unwrap().as_deref(), Some("123456"));

    store
        .set_with_ttl("otp:abc", "654321", Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(store.get("otp:abc").await.unwrap().as_deref(), Some("654321"));

    store.delete("otp:abc").await.unwrap();
    store.delete("otp:abc").await.unwrap();
    assert_eq!(store.get("otp:abc").await.unwrap(), None);
}

#[tokio::test]
async fn kv_expired_entries_are_invisible() {
    let store = SurrealKeyValueStore::new(setup().await);

    store
        .set_with_ttl("blacklist:token:ff", "1", Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.get("blacklist:token:ff").await.unwrap(), None);
    store.purge_expired().await.unwrap();
}
