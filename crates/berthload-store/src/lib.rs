//! Persistence layer for berthload
//!
//! Provides:
//! - Ship catalog
//! - Shipping requests and their ship associations
//! - User accounts
//! - Audit log (append-only)
//! - Session store (TTL key/value with atomic batches)

mod audit;
mod session;
mod sqlite;
mod traits;

pub use audit::*;
pub use session::*;
pub use sqlite::*;
pub use traits::*;

use berthload_util::BerthError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    /// Unique, check or foreign-key constraint rejected the write
    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for BerthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Constraint(msg) => BerthError::Conflict(msg),
            StoreError::NotFound(msg) => BerthError::NotFound(msg),
            StoreError::Serialization(msg) => BerthError::Internal(msg),
            other => BerthError::Unavailable(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
