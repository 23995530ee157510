//! Database-specific error types and conversions.

use finvoice_core::error::FinvoiceError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// A stored value could not be mapped back onto the domain model.
    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Conditional write rejected: {entity} with id {id}")]
    Conflict { entity: String, id: String },
}

impl DbError {
    /// Classify a failed statement. Unique-index violations become
    /// [`DbError::AlreadyExists`].
    pub(crate) fn write_failed(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already contains") {
            DbError::AlreadyExists {
                entity: entity.to_owned(),
            }
        } else {
            DbError::Query(message)
        }
    }
}

impl From<DbError> for FinvoiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => FinvoiceError::NotFound { entity, id },
            DbError::AlreadyExists { entity } => FinvoiceError::AlreadyExists { entity },
            DbError::Conflict { entity, id } => FinvoiceError::Conflict { entity, id },
            other => FinvoiceError::Database(other.to_string()),
        }
    }
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(field: &str, value: Option<String>) -> Result<Option<uuid::Uuid>, DbError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<rust_decimal::Decimal, DbError> {
    value
        .parse()
        .map_err(|e| DbError::Decode(format!("invalid {field} decimal: {e}")))
}
