//! Sync cursors: per-tenant timestamps pacing event retrieval.
//!
//! Remote-peer sync and external-system sync are independent concerns, so
//! four cursors exist. All share replace-on-write semantics and are
//! monotonically non-decreasing after successful writes.

use serde::{Deserialize, Serialize};

/// The four per-tenant sync cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncCursor {
    /// Newest server event timestamp this client has pulled.
    LastRemoteSync,
    /// Newest local event timestamp acknowledged by the server.
    LastLocalSync,
    /// Newest timestamp pushed to a third-party system.
    LastPushExternal,
    /// Newest timestamp pulled from a third-party system.
    LastPullExternal,
}

impl SyncCursor {
    pub const ALL: [SyncCursor; 4] = [
        SyncCursor::LastRemoteSync,
        SyncCursor::LastLocalSync,
        SyncCursor::LastPushExternal,
        SyncCursor::LastPullExternal,
    ];

    /// Stable storage key (embedded object-store id / relational table).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastRemoteSync => "last_remote_sync",
            Self::LastLocalSync => "last_local_sync",
            Self::LastPushExternal => "last_push_external_sync",
            Self::LastPullExternal => "last_pull_external_sync",
        }
    }
}
