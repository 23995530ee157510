//! Integration tests for the user, staff and KYC repositories.

use chrono::Utc;
use finvoice_core::error::FinvoiceError;
use finvoice_core::models::account::{CreateStaff, CreateUser, UpdateUser};
use finvoice_core::models::kyc::{KycStatus, UpsertKyc};
use finvoice_core::repository::{KycRepository, StaffRepository, UserRepository};
use finvoice_db::repository::{
    SurrealKycRepository, SurrealStaffRepository, SurrealUserRepository,
};
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

fn new_user(email: &str) -> CreateUser {
    CreateUser {
        email: email.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        company_name: "Analytical Ltd".into(),
        password_hash: "$argon2id$stub".into(),
    }
}

#[tokio::test]
async fn create_and_get_user() {
    let repo = SurrealUserRepository::new(setup().await);

    let user = repo.create(new_user("a@x.com")).await.unwrap();
    assert_eq!(user.email, "a@x.com");
    assert!(user.is_active);
    assert!(!user.two_factor_enabled);

    let by_id = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(by_id.email, "a@x.com");
    assert_eq!(by_id.company_name, "Analytical Ltd");

    let by_email = repo.get_by_email("a@x.com").await.unwrap();
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
async fn duplicate_email_is_already_exists() {
    let repo = SurrealUserRepository::new(setup().await);
    repo.create(new_user("a@x.com")).await.unwrap();

    let err = repo.create(new_user("a@x.com")).await.unwrap_err();
    assert!(matches!(err, FinvoiceError::AlreadyExists { .. }), "{err:?}");
}

#[tokio::test]
async fn missing_user_is_not_found() {
    let repo = SurrealUserRepository::new(setup().await);

    assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap_err().is_not_found());
    assert!(repo.get_by_email("nobody@x.com").await.unwrap_err().is_not_found());
    assert!(
        repo.update(Uuid::new_v4(), UpdateUser::default())
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn update_user_changes_only_given_fields() {
    let repo = SurrealUserRepository::new(setup().await);
    let user = repo.create(new_user("a@x.com")).await.unwrap();

    let updated = repo
        .update(
            user.id,
            UpdateUser {
                two_factor_enabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.two_factor_enabled);
    assert_eq!(updated.first_name, "Ada");
    assert!(updated.updated_at >= user.updated_at);
}

#[tokio::test]
async fn staff_create_and_record_login() {
    let repo = SurrealStaffRepository::new(setup().await);

    let staff = repo
        .create(CreateStaff {
            email: "ops@fin.com".into(),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            password_hash: "$argon2id$stub".into(),
            position: "admin".into(),
        })
        .await
        .unwrap();
    assert!(staff.last_login_at.is_none());

    repo.record_login(staff.id).await.unwrap();
    let reloaded = repo.get_by_email("ops@fin.com").await.unwrap();
    assert_eq!(reloaded.id, staff.id);
    assert!(reloaded.last_login_at.is_some());
}

#[tokio::test]
async fn kyc_upsert_replaces_record_for_owner() {
    let repo = SurrealKycRepository::new(setup().await);
    let owner_id = Uuid::new_v4();

    let first = repo
        .upsert(UpsertKyc {
            id: Uuid::new_v4(),
            owner_id,
            status: KycStatus::Pending,
            submitted_at: None,
            reviewed_at: None,
            reviewer_id: None,
            rejection_reason: None,
            documents_info: json!({}),
        })
        .await
        .unwrap();
    assert_eq!(first.status, KycStatus::Pending);

    let reviewer = Uuid::new_v4();
    let second = repo
        .upsert(UpsertKyc {
            status: KycStatus::Rejected,
            reviewed_at: Some(Utc::now()),
            reviewer_id: Some(reviewer),
            rejection_reason: Some("blurry scan".into()),
            documents_info: json!({ "passport": "p.pdf" }),
            ..UpsertKyc::from(first.clone())
        })
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.status, KycStatus::Rejected);
    assert_eq!(second.reviewer_id, Some(reviewer));
    assert_eq!(second.documents_info["passport"], "p.pdf");

    let loaded = repo.get_by_owner(owner_id).await.unwrap();
    assert_eq!(loaded.rejection_reason.as_deref(), Some("blurry scan"));
}

#[tokio::test]
async fn kyc_missing_owner_is_not_found() {
    let repo = SurrealKycRepository::new(setup().await);
    assert!(
        repo.get_by_owner(Uuid::new_v4())
            .await
            .unwrap_err()
            .is_not_found()
    );
}
