//! Short-lived one-time passcodes and the access-token revocation list,
//! both kept in a TTL key-value store.

use std::sync::Arc;
use std::time::Duration;

use finvoice_core::external::KeyValueStore;
use rand::Rng;
use uuid::Uuid;

use crate::config::OtpConfig;
use crate::error::AuthError;
use crate::token::hash_token;

const OTP_DIGITS: usize = 6;
const BLACKLIST_PREFIX: &str = "blacklist:token:";

fn otp_key(account_id: Uuid) -> String {
    format!("otp:{account_id}")
}

fn blacklist_key(token: &str) -> String {
    format!("{BLACKLIST_PREFIX}{}", hash_token(token))
}

/// Uniform 6-digit code. Bytes >= 250 are rejected so `% 10` carries no
/// bias.
fn generate_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(OTP_DIGITS);
    while code.len() < OTP_DIGITS {
        let byte: u8 = rng.random();
        if byte < 250 {
            code.push(char::from(b'0' + byte % 10));
        }
    }
    code
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn store_err(e: impl std::fmt::Display) -> AuthError {
    AuthError::Store(e.to_string())
}

pub struct OtpStore<K> {
    store: Arc<K>,
    expiry: Duration,
}

impl<K> Clone for OtpStore<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            expiry: self.expiry,
        }
    }
}

impl<K: KeyValueStore> OtpStore<K> {
    pub fn new(store: Arc<K>, config: &OtpConfig) -> Self {
        Self {
            store,
            expiry: Duration::from_secs(config.expiry_secs),
        }
    }

    /// Generate a code for `account_id`, replacing any outstanding one.
    pub async fn issue(&self, account_id: Uuid) -> Result<String, AuthError> {
        let code = generate_code();
        self.store
            .set_with_ttl(&otp_key(account_id), &code, self.expiry)
            .await
            .map_err(store_err)?;
        Ok(code)
    }

    /// `Ok(false)` when no code is outstanding or `candidate` differs.
    pub async fn verify(&self, account_id: Uuid, candidate: &str) -> Result<bool, AuthError> {
        let stored = self.store.get(&otp_key(account_id)).await.map_err(store_err)?;
        Ok(stored.is_some_and(|code| constant_time_eq(code.as_bytes(), candidate.as_bytes())))
    }

    pub async fn consume(&self, account_id: Uuid) -> Result<(), AuthError> {
        self.store.delete(&otp_key(account_id)).await.map_err(store_err)
    }

    /// Revoke `token` for `ttl`. Only the token's hash is stored.
    pub async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), AuthError> {
        self.store
            .set_with_ttl(&blacklist_key(token), "1", ttl)
            .await
            .map_err(store_err)
    }

    pub async fn is_blacklisted(&self, token: &str) -> Result<bool, AuthError> {
        let entry = self.store.get(&blacklist_key(token)).await.map_err(store_err)?;
        Ok(entry.is_some())
    }
}
