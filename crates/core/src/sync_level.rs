//! Propagation state of an event or entity.

use serde::{Deserialize, Serialize};

/// How far a record has propagated.
///
/// Levels only move upward: `Local → Synced → Remote/External`. A record
/// never regresses to a lower level on re-sync.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncLevel {
    /// Created on this device, not yet acknowledged by the server.
    #[default]
    Local = 0,
    /// Acknowledged by the server during a push.
    Synced = 1,
    /// Originated on the server (or another client) and pulled here.
    Remote = 2,
    /// Originated in a third-party system.
    External = 3,
}

impl SyncLevel {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Local),
            1 => Some(Self::Synced),
            2 => Some(Self::Remote),
            3 => Some(Self::External),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Synced => "synced",
            Self::Remote => "remote",
            Self::External => "external",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "synced" => Some(Self::Synced),
            "remote" => Some(Self::Remote),
            "external" => Some(Self::External),
            _ => None,
        }
    }

    /// Whether a transition to `next` respects the monotonic ordering.
    pub fn can_advance_to(self, next: SyncLevel) -> bool {
        next >= self
    }
}
