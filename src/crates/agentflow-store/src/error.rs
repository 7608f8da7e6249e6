//! Error types for run store operations

use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during run store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the given run id
    #[error("run not found: {0}")]
    NotFound(Uuid),

    /// A record for the given run id already exists
    #[error("run already exists: {0}")]
    AlreadyExists(Uuid),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend storage error
    #[error("storage error: {0}")]
    Storage(String),
}
