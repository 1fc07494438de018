//! Storage failure kinds surfaced by adapters.

use thiserror::Error;

/// Result type used across the storage layer.
pub type StorageResult<T> = Result<T, StorageError>;

/// Adapter-level failure.
///
/// Adapters surface these unchanged; the stores above translate them into
/// domain kinds. Kinds, not backend types: a Postgres unique violation and an
/// in-memory guid collision both surface as `DuplicateEvent`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Adapter used before `initialize()`.
    #[error("storage adapter not initialized")]
    NotInitialized,

    /// Unique-key violation on an event guid.
    #[error("event already stored: {0}")]
    DuplicateEvent(String),

    /// Other unique-constraint violation.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Backend I/O failure; any open transaction was rolled back.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Row or criteria (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
