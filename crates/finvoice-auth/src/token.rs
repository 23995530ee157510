//! Signed access/refresh token issuance and verification (HS256 JWT).

use chrono::{DateTime, TimeZone, Utc};
use finvoice_core::models::account::{Principal, Role};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::AuthError;

/// What a token may be used for. Carried in the `purpose` claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    AccessToken,
    RefreshToken,
}

/// JWT claims embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject: account ID (UUID string).
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub purpose: TokenPurpose,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    pub iss: String,
    /// Unique token ID (UUID string).
    pub jti: String,
}

impl TokenClaims {
    pub fn subject_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| AuthError::TokenInvalid(format!("subject is not a UUID: {e}")))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly signed token and its expiry instant.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and validates tokens with a single shared secret.
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Fails when the secret is empty, so a misconfigured process never
    /// starts issuing tokens.
    pub fn new(config: TokenConfig) -> Result<Self, AuthError> {
        if config.secret.is_empty() {
            return Err(AuthError::SignerMisconfigured(
                "token secret must not be empty".into(),
            ));
        }

        for lifetime in [
            config.access_token_lifetime_secs,
            config.refresh_token_lifetime_secs,
        ] {
            if lifetime_secs(lifetime).is_none() {
                return Err(AuthError::SignerMisconfigured(format!(
                    "token lifetime of {lifetime}s is out of range"
                )));
            }
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        })
    }

    pub fn access_token_lifetime_secs(&self) -> u64 {
        self.config.access_token_lifetime_secs
    }

    pub fn mint(&self, principal: &Principal, purpose: TokenPurpose) -> Result<MintedToken, AuthError> {
        let lifetime = match purpose {
            TokenPurpose::AccessToken => self.config.access_token_lifetime_secs,
            TokenPurpose::RefreshToken => self.config.refresh_token_lifetime_secs,
        };
        let now = Utc::now().timestamp();
        let exp = lifetime_secs(lifetime)
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| {
                AuthError::SignerMisconfigured(format!("token lifetime of {lifetime}s overflows"))
            })?;
        let claims = TokenClaims {
            sub: principal.id.to_string(),
            email: principal.email.clone(),
            role: principal.role,
            purpose,
            iat: now,
            exp,
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::SignerMisconfigured(format!("JWT encode: {e}")))?;
        Ok(MintedToken {
            token,
            expires_at: claims.expires_at(),
        })
    }

    /// Verify signature, algorithm, issuer and expiry, then require the
    /// `purpose` claim to equal `expected`.
    pub fn validate(&self, token: &str, expected: TokenPurpose) -> Result<TokenClaims, AuthError> {
        let claims = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenInvalid("token has expired".into()),
                _ => AuthError::TokenInvalid(e.to_string()),
            })?;

        if claims.purpose != expected {
            return Err(AuthError::TokenInvalid(format!(
                "expected {expected:?}, got {:?}",
                claims.purpose
            )));
        }
        Ok(claims)
    }
}

/// SHA-256 of a raw token, hex-encoded. Used as the revocation key so
/// that raw tokens are never written to the store.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lifetimes are capped at 100 years so `now + lifetime` stays far
/// inside the range of a timestamp.
fn lifetime_secs(lifetime: u64) -> Option<i64> {
    const MAX_LIFETIME_SECS: i64 = 100 * 365 * 24 * 60 * 60;
    i64::try_from(lifetime)
        .ok()
        .filter(|secs| *secs <= MAX_LIFETIME_SECS)
}
