//! Integration tests for the session orchestrator.

mod common;

use std::sync::atomic::Ordering;

use chrono::Utc;
use common::{eventually, setup};
use finvoice_auth::{AuthError, RegisterUser, TokenPurpose};
use finvoice_core::models::account::{CreateStaff, Role, UpdateUser};
use finvoice_core::models::kyc::KycStatus;
use finvoice_core::repository::{
    AuditLogFilter, AuditLogRepository, KycRepository, Pagination, StaffRepository,
    UserRepository,
};
use finvoice_db::repository::{
    SurrealAuditLogRepository, SurrealKycRepository, SurrealStaffRepository,
    SurrealUserRepository,
};

const PASSWORD: &str = "pw12345678";

fn alice() -> RegisterUser {
    RegisterUser {
        email: "a@x.com".into(),
        password: PASSWORD.into(),
        first_name: "Alice".into(),
        last_name: "Anders".into(),
        company_name: "Acme Trading".into(),
    }
}

#[tokio::test]
async fn register_creates_user_with_pending_kyc() {
    let h = setup().await;

    let user = h.svc.register(alice()).await.unwrap();
    assert_eq!(user.email, "a@x.com");
    assert!(user.is_active);
    assert!(!user.two_factor_enabled);
    assert!(user.password_hash.starts_with("$argon2id$"));

    let kyc = SurrealKycRepository::new(h.db.clone())
        .get_by_owner(user.id)
        .await
        .unwrap();
    assert_eq!(kyc.status, KycStatus::Pending);
    assert!(kyc.reviewed_at.is_none());

    eventually(|| !h.mailer.sent_to("a@x.com").is_empty()).await;
    eventually(|| h.events.routing_keys() == ["user.registered"]).await;

    let (exchange, _, payload) = h.events.published.lock().unwrap()[0].clone();
    assert_eq!(exchange, "invoice_events_exchange");
    assert_eq!(payload["user_id"], user.id.to_string());
    assert_eq!(payload["email"], "a@x.com");
}

#[tokio::test]
async fn register_is_audited() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();

    let audit = SurrealAuditLogRepository::new(h.db.clone());
    let mut found = false;
    for _ in 0..100 {
        let page = audit
            .list(
                AuditLogFilter {
                    subject_id: Some(user.id),
                    action: Some("USER_REGISTERED".into()),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        if page.total == 1 {
            found = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(found, "USER_REGISTERED audit entry missing");
}

#[tokio::test]
async fn register_duplicate_email_ignores_case() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();

    let err = h
        .svc
        .register(RegisterUser {
            email: "  A@X.COM ".into(),
            ..alice()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailExists), "{err:?}");
}

#[tokio::test]
async fn register_rejects_short_password() {
    let h = setup().await;
    let err = h
        .svc
        .register(RegisterUser {
            password: "short".into(),
            ..alice()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordTooShort { min: 8 }));
}

#[tokio::test]
async fn register_succeeds_when_event_publish_fails() {
    let h = setup().await;
    h.events.fail.store(true, Ordering::SeqCst);

    let user = h.svc.register(alice()).await.unwrap();
    assert!(
        SurrealUserRepository::new(h.db.clone())
            .get_by_id(user.id)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn login_happy_path() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();

    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    assert!(!outcome.two_factor_required());
    let tokens = outcome.tokens().unwrap();
    assert!(tokens.access_token_expires_at > Utc::now());
    assert!(tokens.refresh_token_expires_at > tokens.access_token_expires_at);

    let claims = h
        .svc
        .tokens()
        .validate(&tokens.access_token, TokenPurpose::AccessToken)
        .unwrap();
    assert_eq!(claims.purpose, TokenPurpose::AccessToken);
    assert_eq!(claims.subject_id().unwrap(), user.id);
    assert_eq!(claims.role, Role::User);
    assert_eq!(claims.iss, "finvoice-test");
}

#[tokio::test]
async fn login_wrong_password_and_unknown_email_look_the_same() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();

    let wrong = h.svc.login("a@x.com", "wrong-password").await.unwrap_err();
    let unknown = h.svc.login("nobody@x.com", PASSWORD).await.unwrap_err();
    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn login_inactive_user() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();
    SurrealUserRepository::new(h.db.clone())
        .update(
            user.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h.svc.login("a@x.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));
}

#[tokio::test]
async fn two_factor_login_flow() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();
    let user = h.svc.toggle_two_factor(user.id, true).await.unwrap();
    assert!(user.two_factor_enabled);

    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    assert!(outcome.two_factor_required());
    assert!(outcome.tokens().is_none());

    eventually(|| h.mailer.last_code_for("a@x.com").is_some()).await;
    let code = h.mailer.last_code_for("a@x.com").unwrap();

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let err = h.svc.verify_two_factor("a@x.com", wrong).await.unwrap_err();
    assert!(matches!(err, AuthError::OtpInvalidOrExpired));

    // A failed attempt does not consume the code.
    let outcome = h.svc.verify_two_factor("a@x.com", &code).await.unwrap();
    assert!(outcome.tokens().is_some());

    // One-time use.
    let err = h.svc.verify_two_factor("a@x.com", &code).await.unwrap_err();
    assert!(matches!(err, AuthError::OtpInvalidOrExpired));
}

#[tokio::test]
async fn otp_store_outage_is_not_reported_as_bad_code() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();
    h.svc.toggle_two_factor(user.id, true).await.unwrap();
    h.svc.login("a@x.com", PASSWORD).await.unwrap();
    eventually(|| h.mailer.last_code_for("a@x.com").is_some()).await;
    let code = h.mailer.last_code_for("a@x.com").unwrap();

    h.kv.fail_reads.store(true, Ordering::SeqCst);
    let err = h.svc.verify_two_factor("a@x.com", &code).await.unwrap_err();
    assert!(matches!(err, AuthError::Store(_)), "{err:?}");

    // The code survives the outage.
    h.kv.fail_reads.store(false, Ordering::SeqCst);
    let outcome = h.svc.verify_two_factor("a@x.com", &code).await.unwrap();
    assert!(outcome.tokens().is_some());
}

#[tokio::test]
async fn verify_two_factor_preconditions() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();

    let err = h
        .svc
        .verify_two_factor("a@x.com", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorNotEnabled));

    let err = h
        .svc
        .verify_two_factor("ghost@x.com", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountNotFound));
}

#[tokio::test]
async fn disabling_two_factor_clears_outstanding_code() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();
    h.svc.toggle_two_factor(user.id, true).await.unwrap();
    h.svc.login("a@x.com", PASSWORD).await.unwrap();
    eventually(|| h.mailer.last_code_for("a@x.com").is_some()).await;
    let code = h.mailer.last_code_for("a@x.com").unwrap();

    h.svc.toggle_two_factor(user.id, false).await.unwrap();
    // Idempotent.
    let user = h.svc.toggle_two_factor(user.id, false).await.unwrap();
    assert!(!user.two_factor_enabled);

    assert!(!h.svc.otp().verify(user.id, &code).await.unwrap());
    assert!(h.kv.inner.is_empty());
}

#[tokio::test]
async fn toggle_two_factor_unknown_account() {
    let h = setup().await;
    let err = h
        .svc
        .toggle_two_factor(uuid::Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountNotFound));
}

#[tokio::test]
async fn refresh_mints_new_pair() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();
    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    let tokens = outcome.tokens().unwrap().clone();

    let refreshed = h.svc.refresh_session(&tokens.refresh_token).await.unwrap();
    assert_ne!(refreshed.access_token, tokens.access_token);
    assert!(h.svc.authenticate(&refreshed.access_token).await.is_ok());

    // The presented refresh token is not revoked by rotation.
    assert!(h.svc.refresh_session(&tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn refresh_rejects_access_token() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();
    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    let tokens = outcome.tokens().unwrap();

    let err = h
        .svc
        .refresh_session(&tokens.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));

    let err = h.svc.authenticate(&tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn refresh_rejects_deactivated_account() {
    let h = setup().await;
    let user = h.svc.register(alice()).await.unwrap();
    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    let refresh = outcome.tokens().unwrap().refresh_token.clone();

    SurrealUserRepository::new(h.db.clone())
        .update(
            user.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h.svc.refresh_session(&refresh).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));
}

#[tokio::test]
async fn refresh_rejects_blacklisted_token() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();
    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    let refresh = outcome.tokens().unwrap().refresh_token.clone();

    h.svc
        .otp()
        .blacklist(&refresh, std::time::Duration::from_secs(60))
        .await
        .unwrap();
    let err = h.svc.refresh_session(&refresh).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenBlacklisted));
}

#[tokio::test]
async fn logout_revokes_access_token() {
    let h = setup().await;
    h.svc.register(alice()).await.unwrap();
    let outcome = h.svc.login("a@x.com", PASSWORD).await.unwrap();
    let access = outcome.tokens().unwrap().access_token.clone();

    assert!(h.svc.authenticate(&access).await.is_ok());
    h.svc.logout(&access).await;

    let err = h.svc.authenticate(&access).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenBlacklisted));
    assert!(h.svc.otp().is_blacklisted(&access).await.unwrap());
}

#[tokio::test]
async fn logout_with_garbage_token_still_succeeds() {
    let h = setup().await;
    h.svc.logout("not-a-jwt").await;
    assert!(h.svc.otp().is_blacklisted("not-a-jwt").await.unwrap());
}

#[tokio::test]
async fn staff_login_issues_staff_tokens() {
    let h = setup().await;
    let staff_repo = SurrealStaffRepository::new(h.db.clone());
    staff_repo
        .create(CreateStaff {
            email: "ops@fin.com".into(),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            password_hash: h.svc.vault().hash("staff-pass-1").unwrap(),
            position: "admin".into(),
        })
        .await
        .unwrap();

    let (staff, tokens) = h.svc.login_staff("OPS@fin.com", "staff-pass-1").await.unwrap();
    let claims = h.svc.authenticate(&tokens.access_token).await.unwrap();
    assert_eq!(claims.role, Role::Staff);
    assert_eq!(claims.subject_id().unwrap(), staff.id);

    // Refresh resolves the staff account, not a user.
    let refreshed = h.svc.refresh_session(&tokens.refresh_token).await.unwrap();
    let claims = h.svc.authenticate(&refreshed.access_token).await.unwrap();
    assert_eq!(claims.role, Role::Staff);

    assert!(
        staff_repo
            .get_by_id(staff.id)
            .await
            .unwrap()
            .last_login_at
            .is_some()
    );

    // Staff credentials are not valid for the business login.
    let err = h.svc.login("ops@fin.com", "staff-pass-1").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    let err = h.svc.login_staff("ops@fin.com", "nope").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}
