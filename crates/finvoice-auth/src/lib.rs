//! Finvoice Auth — password credentials, signed access/refresh tokens,
//! email-delivered one-time passcodes and the session orchestrator.

pub mod config;
pub mod error;
pub mod otp;
pub mod password;
pub mod service;
pub mod token;

pub use config::{OtpConfig, PasswordConfig, SessionConfig, TokenConfig};
pub use error::AuthError;
pub use otp::OtpStore;
pub use password::CredentialVault;
pub use service::{LoginOutcome, RegisterUser, SessionService, SessionTokens};
pub use token::{TokenClaims, TokenPurpose, TokenService};
