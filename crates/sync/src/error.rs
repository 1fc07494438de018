//! Sync and transport failure kinds.

use fieldbook_engine::EngineError;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Failure surfaced by the transport capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Credentials or token rejected by the remote.
    #[error("unauthorized")]
    Unauthorized,

    /// Transient network failure; the caller may retry the whole sync.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// Permanent failure; retrying will not help.
    #[error("fatal network failure: {0}")]
    Fatal(String),
}

/// Failure surfaced by `InternalSyncManager::sync`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A sync is already in flight on this manager; no work was done.
    #[error("sync already running")]
    AlreadyRunning,

    /// Unresolved duplicate candidates gate outbound sync.
    #[error("{pending} unresolved duplicate pair(s) block sync")]
    DuplicatesBlockSync { pending: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
