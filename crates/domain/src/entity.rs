//! Current entity state: single docs and the paired (initial, modified) view.

use fieldbook_core::{DomainError, DomainResult, EntityGuid, SyncLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The two entity shapes the system tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Individual,
    Group,
}

/// Current state of a domain entity, derived by replaying events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDoc {
    pub id: EntityGuid,
    /// Stable identity; equals `id` at creation.
    pub guid: EntityGuid,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Opaque payload. For groups, `data.members` is an ordered sequence of
    /// child entity guids.
    pub data: Value,
    /// Monotonically increasing per successful event application.
    pub version: u64,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub sync_level: SyncLevel,
}

impl EntityDoc {
    /// Member guids of a group, in declared order. Empty for individuals.
    pub fn members(&self) -> Vec<String> {
        self.data
            .get("members")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The paired view of an entity.
///
/// `initial` is the state at the last server-confirmed sync; `modified` is
/// the current state derived from events applied locally since. Invariants:
/// the three guids agree, `modified.version >= initial.version`, and when the
/// versions are equal the two sides are deep-equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPair {
    pub guid: EntityGuid,
    pub initial: EntityDoc,
    pub modified: EntityDoc,
}

impl EntityPair {
    pub fn new(initial: EntityDoc, modified: EntityDoc) -> DomainResult<Self> {
        if initial.guid != modified.guid {
            return Err(DomainError::validation(format!(
                "pair guid mismatch: initial={}, modified={}",
                initial.guid, modified.guid
            )));
        }
        if modified.version < initial.version {
            return Err(DomainError::validation(format!(
                "modified.version {} < initial.version {}",
                modified.version, initial.version
            )));
        }
        Ok(Self {
            guid: initial.guid.clone(),
            initial,
            modified,
        })
    }

    /// Pair for a first save: both sides carry the same snapshot.
    pub fn from_snapshot(doc: EntityDoc) -> Self {
        Self {
            guid: doc.guid.clone(),
            initial: doc.clone(),
            modified: doc,
        }
    }

    /// Whether local changes exist that the server has not confirmed.
    pub fn is_dirty(&self) -> bool {
        self.modified.version > self.initial.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn doc(guid: &str, version: u64) -> EntityDoc {
        EntityDoc {
            id: EntityGuid::new(guid),
            guid: EntityGuid::new(guid),
            entity_type: EntityType::Individual,
            data: json!({"name": "Ana"}),
            version,
            last_updated: "2024-01-01T00:00:00Z".into(),
            external_id: None,
            sync_level: SyncLevel::Local,
        }
    }

    #[test]
    fn snapshot_pair_is_clean() {
        let pair = EntityPair::from_snapshot(doc("p1", 1));
        assert!(!pair.is_dirty());
        assert_eq!(pair.initial, pair.modified);
        assert_eq!(pair.guid.as_str(), "p1");
    }

    #[test]
    fn pair_rejects_guid_mismatch() {
        assert!(EntityPair::new(doc("p1", 1), doc("p2", 1)).is_err());
    }

    #[test]
    fn pair_rejects_version_regression() {
        assert!(EntityPair::new(doc("p1", 3), doc("p1", 2)).is_err());
        assert!(EntityPair::new(doc("p1", 1), doc("p1", 3)).is_ok());
    }

    #[test]
    fn group_members_read_in_order() {
        let mut d = doc("g1", 1);
        d.entity_type = EntityType::Group;
        d.data = json!({"members": ["a", "b", "c"]});
        assert_eq!(d.members(), vec!["a", "b", "c"]);

        assert!(doc("p1", 1).members().is_empty());
    }
}
