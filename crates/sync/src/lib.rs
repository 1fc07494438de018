//! Bidirectional sync against a remote server: a two-phase (push-then-pull)
//! paginated exchange over an injected transport capability.

pub mod error;
pub mod manager;
pub mod transport;

pub use error::{SyncError, SyncResult, TransportError};
pub use manager::{InternalSyncManager, SyncConfig, SyncPhase, SyncReport};
pub use transport::{AuthToken, Credentials, PullPage, PushAck, RemoteSyncTransport};
