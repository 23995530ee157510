//! Session orchestration: registration, login, second factor, refresh,
//! logout and two-factor toggling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use finvoice_core::SideEffects;
use finvoice_core::error::FinvoiceError;
use finvoice_core::external::{Email, EventPublisher, KeyValueStore, Mailer};
use finvoice_core::models::account::{
    CreateUser, Principal, Role, Staff, UpdateUser, User, normalize_email,
};
use finvoice_core::models::audit::CreateAuditLogEntry;
use finvoice_core::models::kyc::{KycStatus, UpsertKyc};
use finvoice_core::repository::{AuditLogRepository, KycRepository, StaffRepository, UserRepository};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::otp::OtpStore;
use crate::password::CredentialVault;
use crate::token::{TokenClaims, TokenPurpose, TokenService};

/// Minimum revocation window for a token that has already expired.
const MIN_BLACKLIST_TTL: Duration = Duration::from_secs(60);

/// Input for the registration flow.
#[derive(Debug)]
pub struct RegisterUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
}

/// An access/refresh pair with absolute expiry instants.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated { user: User, tokens: SessionTokens },
    /// A code was emailed; no tokens are issued until it is verified.
    TwoFactorRequired { user: User },
}

impl LoginOutcome {
    pub fn two_factor_required(&self) -> bool {
        matches!(self, LoginOutcome::TwoFactorRequired { .. })
    }

    pub fn tokens(&self) -> Option<&SessionTokens> {
        match self {
            LoginOutcome::Authenticated { tokens, .. } => Some(tokens),
            LoginOutcome::TwoFactorRequired { .. } => None,
        }
    }
}

/// Authentication service.
///
/// Generic over repository and collaborator implementations so that the
/// auth layer has no dependency on the database or transport crates.
pub struct SessionService<U, S, C, K, M, P, A> {
    users: U,
    staff: S,
    kyc: C,
    vault: CredentialVault,
    tokens: TokenService,
    otp: OtpStore<K>,
    effects: SideEffects<M, P, A>,
    config: SessionConfig,
}

impl<U, S, C, K, M, P, A> SessionService<U, S, C, K, M, P, A>
where
    U: UserRepository,
    S: StaffRepository,
    C: KycRepository,
    K: KeyValueStore,
    M: Mailer + 'static,
    P: EventPublisher + 'static,
    A: AuditLogRepository + 'static,
{
    /// Fails only when the token signer is misconfigured.
    pub fn new(
        users: U,
        staff: S,
        kyc: C,
        kv: Arc<K>,
        effects: SideEffects<M, P, A>,
        config: SessionConfig,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            users,
            staff,
            kyc,
            vault: CredentialVault::new(&config.password),
            tokens: TokenService::new(config.token.clone())?,
            otp: OtpStore::new(kv, &config.otp),
            effects,
            config,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn otp(&self) -> &OtpStore<K> {
        &self.otp
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Create a business account and its pending KYC record.
    pub async fn register(&self, input: RegisterUser) -> Result<User, AuthError> {
        let email = normalize_email(&input.email);
        let min = self.config.password.min_password_length;
        if input.password.chars().count() < min {
            return Err(AuthError::PasswordTooShort { min });
        }

        match self.users.get_by_email(&email).await {
            Ok(_) => return Err(AuthError::EmailExists),
            Err(FinvoiceError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let password_hash = self.vault.hash(&input.password)?;
        let user = self
            .users
            .create(CreateUser {
                email,
                first_name: input.first_name,
                last_name: input.last_name,
                company_name: input.company_name,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                FinvoiceError::AlreadyExists { .. } => AuthError::EmailExists,
                other => other.into(),
            })?;

        if let Err(e) = self
            .kyc
            .upsert(UpsertKyc {
                id: Uuid::new_v4(),
                owner_id: user.id,
                status: KycStatus::Pending,
                submitted_at: None,
                reviewed_at: None,
                reviewer_id: None,
                rejection_reason: None,
                documents_info: json!({}),
            })
            .await
        {
            warn!(user_id = %user.id, error = %e, "Failed to create initial KYC record");
        }

        self.effects.email(Email::new(
            &user.email,
            "Welcome to Invoice Financing",
            format!(
                "Hello {},\n\nYour account for {} has been created. \
                 Please complete KYC verification before uploading invoices.",
                user.first_name, user.company_name
            ),
        ));
        self.effects.publish(
            &self.config.event_exchange,
            &self.config.user_registered_routing_key,
            json!({ "user_id": user.id, "email": user.email }),
        );
        self.effects.audit(
            CreateAuditLogEntry::new("USER_REGISTERED", json!({ "email": user.email }))
                .actor(user.id)
                .subject(user.id),
        );

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check credentials; either issue a token pair or email a one-time
    /// code when two-factor authentication is enabled.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        // Unknown email and wrong password are indistinguishable.
        let user = match self.users.get_by_email(&normalize_email(email)).await {
            Ok(u) => u,
            Err(FinvoiceError::NotFound { .. }) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };
        if !self.vault.verify(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        if user.two_factor_enabled {
            let code = self.otp.issue(user.id).await?;
            let minutes = self.config.otp.expiry_secs.div_ceil(60);
            self.effects.email(Email::new(
                &user.email,
                "Your login verification code",
                format!(
                    "Your verification code is {code}. It expires in {minutes} minute(s)."
                ),
            ));
            info!(user_id = %user.id, "Two-factor code issued");
            return Ok(LoginOutcome::TwoFactorRequired { user });
        }

        let tokens = self.mint_pair(&Principal::from(&user))?;
        self.audit_login(&user, false);
        Ok(LoginOutcome::Authenticated { user, tokens })
    }

    /// Complete a two-factor login with the emailed code.
    pub async fn verify_two_factor(
        &self,
        email: &str,
        code: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let user = self.user_by_email(&normalize_email(email)).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        // An unreachable store is an outage, not a wrong code.
        if !self.otp.verify(user.id, code.trim()).await? {
            return Err(AuthError::OtpInvalidOrExpired);
        }
        if let Err(e) = self.otp.consume(user.id).await {
            warn!(user_id = %user.id, error = %e, "Failed to consume OTP");
        }

        let tokens = self.mint_pair(&Principal::from(&user))?;
        self.audit_login(&user, true);
        Ok(LoginOutcome::Authenticated { user, tokens })
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The presented refresh token is not revoked and stays usable until
    /// its own expiry.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        let claims = self.tokens.validate(refresh_token, TokenPurpose::RefreshToken)?;
        if self.otp.is_blacklisted(refresh_token).await? {
            return Err(AuthError::TokenBlacklisted);
        }

        let account_id = claims.subject_id()?;
        let principal = match claims.role {
            Role::User => {
                let user = account(self.users.get_by_id(account_id).await)?;
                if !user.is_active {
                    return Err(AuthError::AccountInactive);
                }
                Principal::from(&user)
            }
            Role::Staff => {
                let staff = account(self.staff.get_by_id(account_id).await)?;
                if !staff.is_active {
                    return Err(AuthError::AccountInactive);
                }
                Principal::from(&staff)
            }
        };

        self.mint_pair(&principal)
    }

    /// Revoke an access token for the rest of its lifetime.
    ///
    /// Always succeeds from the caller's point of view.
    pub async fn logout(&self, access_token: &str) {
        let ttl = match self.tokens.validate(access_token, TokenPurpose::AccessToken) {
            Ok(claims) => {
                let remaining = claims.exp - Utc::now().timestamp();
                Duration::from_secs(remaining.max(0) as u64).max(MIN_BLACKLIST_TTL)
            }
            Err(_) => Duration::from_secs(self.tokens.access_token_lifetime_secs()),
        };

        if let Err(e) = self.otp.blacklist(access_token, ttl).await {
            warn!(error = %e, "Failed to blacklist token on logout");
        }
    }

    /// Enable or disable two-factor login. Disabling discards any
    /// outstanding code. Setting the current value again is a no-op.
    pub async fn toggle_two_factor(&self, user_id: Uuid, enable: bool) -> Result<User, AuthError> {
        let user = account(self.users.get_by_id(user_id).await)?;
        let user = if user.two_factor_enabled == enable {
            user
        } else {
            self.users
                .update(
                    user_id,
                    UpdateUser {
                        two_factor_enabled: Some(enable),
                        ..Default::default()
                    },
                )
                .await?
        };

        if !enable {
            if let Err(e) = self.otp.consume(user_id).await {
                warn!(%user_id, error = %e, "Failed to clear OTP while disabling 2FA");
            }
        }

        self.effects.audit(
            CreateAuditLogEntry::new("USER_2FA_TOGGLED", json!({ "enabled": enable }))
                .actor(user_id)
                .subject(user_id),
        );
        Ok(user)
    }

    /// Password login for back-office staff. Staff accounts have no
    /// second factor.
    pub async fn login_staff(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Staff, SessionTokens), AuthError> {
        let staff = match self.staff.get_by_email(&normalize_email(email)).await {
            Ok(s) => s,
            Err(FinvoiceError::NotFound { .. }) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };
        if !self.vault.verify(password, &staff.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !staff.is_active {
            return Err(AuthError::AccountInactive);
        }

        let tokens = self.mint_pair(&Principal::from(&staff))?;
        if let Err(e) = self.staff.record_login(staff.id).await {
            warn!(staff_id = %staff.id, error = %e, "Failed to record staff login time");
        }
        self.effects.audit(
            CreateAuditLogEntry::new("STAFF_LOGIN", json!({ "email": staff.email }))
                .actor(staff.id)
                .subject(staff.id),
        );
        Ok((staff, tokens))
    }

    /// Resolve the caller of a protected operation from its access token.
    ///
    /// Revoked tokens are rejected on every call, not only at refresh.
    pub async fn authenticate(&self, access_token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.tokens.validate(access_token, TokenPurpose::AccessToken)?;
        if self.otp.is_blacklisted(access_token).await? {
            return Err(AuthError::TokenBlacklisted);
        }
        Ok(claims)
    }

    fn mint_pair(&self, principal: &Principal) -> Result<SessionTokens, AuthError> {
        let access = self.tokens.mint(principal, TokenPurpose::AccessToken)?;
        let refresh = self.tokens.mint(principal, TokenPurpose::RefreshToken)?;
        Ok(SessionTokens {
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
        })
    }

    async fn user_by_email(&self, email: &str) -> Result<User, AuthError> {
        account(self.users.get_by_email(email).await)
    }

    fn audit_login(&self, user: &User, two_factor: bool) {
        self.effects.audit(
            CreateAuditLogEntry::new("USER_LOGIN", json!({ "two_factor": two_factor }))
                .actor(user.id)
                .subject(user.id),
        );
    }
}

/// Map a repository lookup so that a missing account is reported as
/// [`AuthError::AccountNotFound`].
fn account<T>(result: Result<T, FinvoiceError>) -> Result<T, AuthError> {
    result.map_err(|e| match e {
        FinvoiceError::NotFound { .. } => AuthError::AccountNotFound,
        other => other.into(),
    })
}
