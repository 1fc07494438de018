//! Canonical event serialization.
//!
//! The canonical form must be reproducible bit-for-bit across backends:
//! object keys sorted recursively, no whitespace, nulls written as `null`,
//! array order preserved, and number literals emitted as received
//! (`serde_json`'s `arbitrary_precision` keeps the source text). The
//! `sync_level` field is excluded so a level transition never changes the
//! hash.

use fieldbook_domain::FormSubmission;
use serde_json::{Map, Value};

/// The canonical JSON form of an event, ready for hashing.
pub fn canonical_json(event: &FormSubmission) -> String {
    let mut fields = Map::new();
    fields.insert(
        "guid".to_string(),
        Value::String(event.guid.as_str().to_string()),
    );
    fields.insert(
        "entityGuid".to_string(),
        Value::String(event.entity_guid.as_str().to_string()),
    );
    fields.insert(
        "type".to_string(),
        Value::String(event.event_type.clone()),
    );
    fields.insert("data".to_string(), event.data.clone());
    fields.insert(
        "timestamp".to_string(),
        Value::String(event.timestamp.clone()),
    );
    fields.insert(
        "userId".to_string(),
        Value::String(event.user_id.as_str().to_string()),
    );

    let mut out = String::new();
    write_value(&mut out, &Value::Object(fields));
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json handles escaping; a bare string cannot fail to serialize.
    out.push_str(&serde_json::to_string(s).expect("string serialization"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, UserId};
    use serde_json::json;

    fn event(data: Value) -> FormSubmission {
        FormSubmission {
            guid: EventGuid::new("e1"),
            entity_guid: EntityGuid::new("p1"),
            event_type: "create-individual".to_string(),
            data,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            user_id: UserId::new("u1"),
            sync_level: SyncLevel::Local,
        }
    }

    #[test]
    fn keys_are_sorted_with_no_whitespace() {
        let canon = canonical_json(&event(json!({"zeta": 1, "alpha": {"b": 2, "a": 1}})));
        assert_eq!(
            canon,
            r#"{"data":{"alpha":{"a":1,"b":2},"zeta":1},"entityGuid":"p1","guid":"e1","timestamp":"2024-01-01T00:00:00Z","type":"create-individual","userId":"u1"}"#
        );
    }

    #[test]
    fn sync_level_is_excluded() {
        let local = event(json!({"name": "Ana"}));
        let synced = local.clone().with_sync_level(SyncLevel::Synced);
        assert_eq!(canonical_json(&local), canonical_json(&synced));
    }

    #[test]
    fn nulls_and_arrays_are_preserved() {
        let canon = canonical_json(&event(json!({"tags": ["b", "a"], "gone": null})));
        assert!(canon.contains(r#""tags":["b","a"]"#));
        assert!(canon.contains(r#""gone":null"#));
    }

    #[test]
    fn number_literals_survive() {
        let canon = canonical_json(&event(
            serde_json::from_str(r#"{"weight": 10.50, "count": 3}"#).unwrap(),
        ));
        assert!(canon.contains(r#""weight":10.50"#));
        assert!(canon.contains(r#""count":3"#));
    }
}
