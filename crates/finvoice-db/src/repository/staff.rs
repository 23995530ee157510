//! SurrealDB implementation of [`StaffRepository`].

use chrono::{DateTime, Utc};
use finvoice_core::error::FinvoiceResult;
use finvoice_core::models::account::{CreateStaff, Staff};
use finvoice_core::repository::StaffRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct StaffRow {
    record_id: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    position: String,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StaffRow {
    fn try_into_staff(self) -> Result<Staff, DbError> {
        Ok(Staff {
            id: parse_uuid("staff", &self.record_id)?,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash: self.password_hash,
            position: self.position,
            is_active: self.is_active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealStaffRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealStaffRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch_one(&self, query: &str, key: &'static str, value: String) -> FinvoiceResult<Staff> {
        let mut result = self
            .db
            .query(query)
            .bind((key, value.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<StaffRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "staff".into(),
            id: format!("{key}={value}"),
        })?;
        Ok(row.try_into_staff()?)
    }
}

impl<C: Connection> StaffRepository for SurrealStaffRepository<C> {
    async fn create(&self, input: CreateStaff) -> FinvoiceResult<Staff> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('staff', $id) SET \
                 email = $email, first_name = $first_name, \
                 last_name = $last_name, password_hash = $password_hash, \
                 position = $position, is_active = true, \
                 last_login_at = NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("email", input.email))
            .bind(("first_name", input.first_name))
            .bind(("last_name", input.last_name))
            .bind(("password_hash", input.password_hash))
            .bind(("position", input.position))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::write_failed("staff", e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> FinvoiceResult<Staff> {
        self.fetch_one(
            "SELECT meta::id(id) AS record_id, * FROM type::record('staff', $id)",
            "id",
            id.to_string(),
        )
        .await
    }

    async fn get_by_email(&self, email: &str) -> FinvoiceResult<Staff> {
        self.fetch_one(
            "SELECT meta::id(id) AS record_id, * FROM staff WHERE email = $email",
            "email",
            email.to_string(),
        )
        .await
    }

    async fn record_login(&self, id: Uuid) -> FinvoiceResult<()> {
        self.db
            .query(
                "UPDATE type::record('staff', $id) SET \
                 last_login_at = time::now(), updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
