//! Error types for tripboard-store

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Entity absent, or present but not readable by the principal.
    /// Both cases map to this variant.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity readable but the write check failed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Map a diesel error from a named operation, surfacing unique
    /// constraint violations as conflicts.
    pub fn query(context: &str) -> impl Fn(DieselError) -> StorageError + '_ {
        move |e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StorageError::Conflict(format!("{}: {}", context, info.message()))
            }
            DieselError::NotFound => StorageError::NotFound(context.to_string()),
            other => StorageError::Internal(format!("{} failed: {}", context, other)),
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        StorageError::NotFound(format!("{} {}", what, id))
    }
}
