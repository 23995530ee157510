//! Account domain models: business users and back-office staff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which class of account a credential belongs to.
///
/// Serialized as the `role` claim of every token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Staff => "staff",
        }
    }
}

/// A business account that uploads invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    /// Argon2id PHC string. Never serialized into logs or responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    /// Already-hashed password.
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub is_active: Option<bool>,
    pub two_factor_enabled: Option<bool>,
}

/// A back-office reviewer who approves KYC and invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Free-form back-office role label (e.g. `admin`, `analyst`).
    pub position: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateStaff {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub position: String,
}

/// The identity fields every token is minted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: Role::User,
        }
    }
}

impl From<&Staff> for Principal {
    fn from(staff: &Staff) -> Self {
        Self {
            id: staff.id,
            email: staff.email.clone(),
            role: Role::Staff,
        }
    }
}

/// Canonical form of an email address used for storage and lookup.
///
/// Addresses are trimmed and lower-cased so that uniqueness does not
/// depend on the casing a client happened to submit.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
