//! Authentication configuration.
//!
//! Each component receives only its own section; there is no global
//! configuration object.

/// Signing and lifetime settings for [`crate::token::TokenService`].
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Shared HMAC secret. Must be non-empty.
    pub secret: String,
    /// JWT issuer (`iss` claim).
    pub issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "invoice-financing-app".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length accepted at registration.
    pub min_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            pepper: None,
            min_password_length: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// Lifetime of an emailed login code in seconds (default: 300).
    pub expiry_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self { expiry_secs: 300 }
    }
}

/// Settings for [`crate::service::SessionService`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token: TokenConfig,
    pub password: PasswordConfig,
    pub otp: OtpConfig,
    /// Exchange that `user.registered` is published to.
    pub event_exchange: String,
    pub user_registered_routing_key: String,
}

impl SessionConfig {
    pub fn new(token: TokenConfig) -> Self {
        Self {
            token,
            password: PasswordConfig::default(),
            otp: OtpConfig::default(),
            event_exchange: "invoice_events_exchange".into(),
            user_registered_routing_key: "user.registered".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(TokenConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_config_names_event_routes() {
        let config = SessionConfig::default();
        assert_eq!(config.event_exchange, "invoice_events_exchange");
        assert_eq!(config.user_registered_routing_key, "user.registered");
        assert_eq!(config.otp.expiry_secs, 300);
        assert_eq!(config.password.min_password_length, 8);
    }
}
