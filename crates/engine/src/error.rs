//! Engine error model: domain kinds with storage failures translated in.

use fieldbook_core::DomainError;
use fieldbook_store::StorageError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure surfaced by the stores and the façade.
///
/// Storage errors are translated here, never swallowed: a unique-key
/// violation on an event guid becomes `DuplicateEvent` so callers can treat
/// it as idempotent success on the pull path and as a failure on direct
/// submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage adapter not initialized")]
    NotInitialized,

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::UnknownEventType(tag) => Self::UnknownEventType(tag),
            DomainError::DuplicateEvent(guid) => Self::DuplicateEvent(guid),
            DomainError::Integrity(msg) => Self::Integrity(msg),
            DomainError::NotFound => Self::NotFound,
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateEvent(guid) => Self::DuplicateEvent(guid),
            StorageError::NotInitialized => Self::NotInitialized,
            other => Self::Storage(other),
        }
    }
}
