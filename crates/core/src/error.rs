//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure, empty guid).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An event carried a type tag no reducer handles.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An event with this guid is already in the log.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// A Merkle proof failed verification.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. entity already exists).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unknown_event_type(tag: impl Into<String>) -> Self {
        Self::UnknownEventType(tag.into())
    }

    pub fn duplicate_event(guid: impl Into<String>) -> Self {
        Self::DuplicateEvent(guid.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
