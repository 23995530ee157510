//! Error types shared by the persistence and collaborator layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FinvoiceError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    /// A conditional write found the row in a different state than the
    /// caller read it in.
    #[error("Entity {entity} with id {id} was modified concurrently")]
    Conflict { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FinvoiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FinvoiceError::NotFound { .. })
    }
}

pub type FinvoiceResult<T> = Result<T, FinvoiceError>;
