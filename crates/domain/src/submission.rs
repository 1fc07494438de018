//! The event type: an immutable form submission against an entity.

use chrono::{DateTime, FixedOffset};
use fieldbook_core::{DomainError, DomainResult, EntityGuid, EventGuid, SyncLevel, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A form submission: the atomic, immutable unit of change.
///
/// Submissions are append-only. Once in the log, every field is frozen except
/// `sync_level`, which may only advance (`Local → Synced → Remote/External`).
///
/// `timestamp` is the wall-clock ISO-8601 string assigned by the originator.
/// It is kept as a string end-to-end: the originator's representation is what
/// gets hashed into the Merkle tree, and ISO-8601 strings of a common format
/// order lexicographically, which is what the sync cursors rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    pub guid: EventGuid,
    pub entity_guid: EntityGuid,
    /// Opaque type tag dispatched to the reducer (e.g. "create-individual").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque structured payload. The core only reads the fields it owns
    /// (`parentGuid`, `members`, `member`, `externalId`).
    pub data: Value,
    pub timestamp: String,
    pub user_id: UserId,
    #[serde(default)]
    pub sync_level: SyncLevel,
}

impl FormSubmission {
    /// Create a submission with a freshly minted guid at `SyncLevel::Local`.
    pub fn new(
        entity_guid: EntityGuid,
        event_type: impl Into<String>,
        data: Value,
        timestamp: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            guid: EventGuid::generate(),
            entity_guid,
            event_type: event_type.into(),
            data,
            timestamp: timestamp.into(),
            user_id,
            sync_level: SyncLevel::Local,
        }
    }

    /// Parse the originator timestamp, surfacing malformed input.
    pub fn parsed_timestamp(&self) -> DomainResult<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).map_err(|e| {
            DomainError::validation(format!("unparseable timestamp '{}': {e}", self.timestamp))
        })
    }

    /// The `parentGuid` back-reference inside the payload, if any.
    pub fn parent_guid(&self) -> Option<&str> {
        self.data.get("parentGuid").and_then(Value::as_str)
    }

    pub fn with_sync_level(mut self, level: SyncLevel) -> Self {
        self.sync_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> FormSubmission {
        FormSubmission::new(
            EntityGuid::new("p1"),
            "create-individual",
            json!({"name": "Ana"}),
            "2024-01-01T00:00:00Z",
            UserId::new("u1"),
        )
    }

    #[test]
    fn new_submission_starts_local() {
        let s = submission();
        assert_eq!(s.sync_level, SyncLevel::Local);
        assert!(!s.guid.is_empty());
    }

    #[test]
    fn timestamp_parses() {
        assert!(submission().parsed_timestamp().is_ok());

        let mut bad = submission();
        bad.timestamp = "yesterday".into();
        assert!(bad.parsed_timestamp().is_err());
    }

    #[test]
    fn parent_guid_reads_payload() {
        let mut s = submission();
        assert_eq!(s.parent_guid(), None);
        s.data = json!({"parentGuid": "g1"});
        assert_eq!(s.parent_guid(), Some("g1"));
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let s = submission();
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("entityGuid").is_some());
        assert!(v.get("type").is_some());
        assert!(v.get("userId").is_some());
        assert_eq!(v["syncLevel"], "local");
    }
}
