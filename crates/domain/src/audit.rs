//! Append-only audit trail: one entry per event application.

use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::submission::FormSubmission;

/// Audit record for a single event application.
///
/// `signature` is the SHA-256 hex of the applied event's canonical form,
/// linking the entry to its Merkle leaf. It is a data field; the core never
/// verifies authorship from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub guid: EventGuid,
    pub entity_guid: EntityGuid,
    pub event_guid: EventGuid,
    /// The reducer action, e.g. "create-individual".
    pub action: String,
    /// Opaque diff; the applied event's payload.
    pub changes: Value,
    pub user_id: UserId,
    pub timestamp: String,
    pub signature: String,
    #[serde(default)]
    pub sync_level: SyncLevel,
}

impl AuditLogEntry {
    /// Record the application of `event`, minting a fresh entry guid.
    pub fn for_application(event: &FormSubmission, signature: impl Into<String>) -> Self {
        Self {
            guid: EventGuid::generate(),
            entity_guid: event.entity_guid.clone(),
            event_guid: event.guid.clone(),
            action: event.event_type.clone(),
            changes: event.data.clone(),
            user_id: event.user_id.clone(),
            timestamp: event.timestamp.clone(),
            signature: signature.into(),
            sync_level: event.sync_level,
        }
    }
}
