//! Entity-subtree traversal over the parent/child relation declared in
//! event payloads. Shared by both backends.

use std::collections::{HashMap, HashSet, VecDeque};

use fieldbook_domain::FormSubmission;

/// Events whose entity is `root` or a transitive descendant under
/// `data.parentGuid`, filtered to `timestamp >= since` (inclusive), sorted
/// ascending by timestamp.
///
/// Traversal is breadth-first over an adjacency built from the full log,
/// with a visited set so cyclic parent links terminate.
pub(crate) fn collect_subtree(
    log: &[FormSubmission],
    root: &str,
    since_inclusive: &str,
) -> Vec<FormSubmission> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for event in log {
        if let Some(parent) = event.parent_guid() {
            children
                .entry(parent)
                .or_default()
                .push(event.entity_guid.as_str());
        }
    }

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    reachable.insert(root);
    queue.push_back(root);
    while let Some(current) = queue.pop_front() {
        for child in children.get(current).into_iter().flatten() {
            if reachable.insert(child) {
                queue.push_back(child);
            }
        }
    }

    let mut events: Vec<FormSubmission> = log
        .iter()
        .filter(|e| reachable.contains(e.entity_guid.as_str()))
        .filter(|e| e.timestamp.as_str() >= since_inclusive)
        .cloned()
        .collect();
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, UserId};
    use serde_json::json;

    fn event(guid: &str, entity: &str, parent: Option<&str>, ts: &str) -> FormSubmission {
        let data = match parent {
            Some(p) => json!({"parentGuid": p}),
            None => json!({}),
        };
        FormSubmission {
            guid: EventGuid::new(guid),
            entity_guid: EntityGuid::new(entity),
            event_type: "create-individual".to_string(),
            data,
            timestamp: ts.to_string(),
            user_id: UserId::new("u1"),
            sync_level: SyncLevel::Local,
        }
    }

    #[test]
    fn descendants_are_collected_breadth_first() {
        let log = vec![
            event("e1", "a", None, "2024-01-01T00:00:00Z"),
            event("e2", "b", Some("a"), "2024-01-02T00:00:00Z"),
            event("e3", "c", Some("b"), "2024-01-03T00:00:00Z"),
            event("e4", "x", None, "2024-01-04T00:00:00Z"),
        ];
        let events = collect_subtree(&log, "a", "");
        let guids: Vec<&str> = events.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn inclusive_timestamp_filter() {
        let log = vec![
            event("e1", "a", None, "2024-01-01T00:00:00Z"),
            event("e2", "b", Some("a"), "2024-01-02T00:00:00Z"),
        ];
        let events = collect_subtree(&log, "a", "2024-01-02T00:00:00Z");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].guid.as_str(), "e2");
    }

    #[test]
    fn cyclic_parent_links_terminate() {
        let log = vec![
            event("e1", "a", Some("b"), "2024-01-01T00:00:00Z"),
            event("e2", "b", Some("a"), "2024-01-02T00:00:00Z"),
        ];
        let events = collect_subtree(&log, "a", "");
        let guids: Vec<&str> = events.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["e1", "e2"]);
    }
}
