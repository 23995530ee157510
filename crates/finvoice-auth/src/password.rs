//! Password hashing and verification using Argon2id.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::Rng;
use tracing::warn;

use crate::config::PasswordConfig;
use crate::error::AuthError;

/// One-way credential hashing with an optional server-side pepper.
///
/// Hashes are PHC strings, so the salt and cost parameters travel with
/// the stored value and verification does not depend on the current
/// parameters.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    pepper: Option<String>,
}

impl CredentialVault {
    pub fn new(config: &PasswordConfig) -> Self {
        Self {
            pepper: config.pepper.clone(),
        }
    }

    fn peppered(&self, password: &str) -> String {
        match &self.pepper {
            Some(p) => format!("{p}{password}"),
            None => password.to_owned(),
        }
    }

    /// Hash a password with Argon2id using OWASP-recommended parameters
    /// and a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
        let params = argon2::Params::new(19456, 2, 1, None)
            .map_err(|e| AuthError::Hashing(format!("argon2 params error: {e}")))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let salt_bytes: [u8; 16] = rand::rng().random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Hashing(format!("salt encode error: {e}")))?;

        let hash = argon2
            .hash_password(self.peppered(password).as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(format!("password hash error: {e}")))?;
        Ok(hash.to_string())
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// Never fails: a mismatch and an unparseable hash both yield `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        Argon2::default()
            .verify_password(self.peppered(password).as_bytes(), &parsed)
            .is_ok()
    }
}
