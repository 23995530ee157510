//! Authentication error types.

use finvoice_core::error::FinvoiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    EmailExists,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("account is not active")]
    AccountInactive,

    #[error("account not found")]
    AccountNotFound,

    #[error("one-time passcode is invalid or has expired")]
    OtpInvalidOrExpired,

    #[error("two-factor authentication is not enabled for this account")]
    TwoFactorNotEnabled,

    /// Bad signature, malformed, expired, or wrong purpose.
    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token has been revoked")]
    TokenBlacklisted,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signer misconfigured: {0}")]
    SignerMisconfigured(String),

    #[error("key-value store error: {0}")]
    Store(String),

    #[error(transparent)]
    Repository(#[from] FinvoiceError),
}

pub type AuthResult<T> = Result<T, AuthError>;
