//! OTP and revocation-list behaviour against the in-memory TTL store.

use std::sync::Arc;
use std::time::Duration;

use finvoice_auth::{OtpConfig, OtpStore};
use finvoice_infra::MemoryKeyValueStore;
use uuid::Uuid;

fn store() -> OtpStore<MemoryKeyValueStore> {
    OtpStore::new(Arc::new(MemoryKeyValueStore::new()), &OtpConfig::default())
}

#[tokio::test]
async fn issued_code_verifies_until_consumed() {
    let otp = store();
    let account = Uuid::new_v4();

    let code = otp.issue(account).await.unwrap();
    assert_eq!(code.len(), 6);
    assert!(otp.verify(account, &code).await.unwrap());
    assert!(otp.verify(account, &code).await.unwrap());

    otp.consume(account).await.unwrap();
    assert!(!otp.verify(account, &code).await.unwrap());
}

#[tokio::test]
async fn reissue_replaces_previous_code() {
    let otp = store();
    let account = Uuid::new_v4();

    let mut first = otp.issue(account).await.unwrap();
    let mut second = otp.issue(account).await.unwrap();
    while second == first {
        first = second;
        second = otp.issue(account).await.unwrap();
    }
    assert!(!otp.verify(account, &first).await.unwrap());
    assert!(otp.verify(account, &second).await.unwrap());
}

#[tokio::test]
async fn codes_are_scoped_to_account() {
    let otp = store();
    let code = otp.issue(Uuid::new_v4()).await.unwrap();
    assert!(!otp.verify(Uuid::new_v4(), &code).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn code_expires_after_configured_ttl() {
    let otp = store();
    let account = Uuid::new_v4();
    let code = otp.issue(account).await.unwrap();

    tokio::time::advance(Duration::from_secs(299)).await;
    assert!(otp.verify(account, &code).await.unwrap());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!otp.verify(account, &code).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn blacklist_holds_for_ttl() {
    let otp = store();

    otp.blacklist("tok", Duration::from_secs(60)).await.unwrap();
    assert!(otp.is_blacklisted("tok").await.unwrap());
    assert!(!otp.is_blacklisted("other").await.unwrap());

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(!otp.is_blacklisted("tok").await.unwrap());
}
