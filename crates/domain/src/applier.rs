//! The event reducer: `(entity state, event) → next state`.
//!
//! A closed sum of event kinds with exhaustive dispatch, so handler coverage
//! is checked at compile time. Handlers are pure: they read nothing but their
//! arguments, increment `version` by exactly one, and stamp `last_updated`
//! from the event's timestamp. Any context a handler needs must arrive inside
//! the event payload.

use fieldbook_core::{DomainError, DomainResult, EntityGuid, EventGuid};
use serde_json::{Map, Value};

use crate::entity::{EntityDoc, EntityType};
use crate::submission::FormSubmission;

/// The typed event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CreateIndividual,
    CreateGroup,
    UpdateIndividual,
    UpdateGroup,
    AddMember,
    RemoveMember,
    CreateIndividualFromGroup,
    DeleteIndividual,
    DeleteGroup,
}

impl EventKind {
    /// Resolve a wire tag; `None` means no reducer handles it.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "create-individual" => Some(Self::CreateIndividual),
            "create-group" => Some(Self::CreateGroup),
            "update-individual" => Some(Self::UpdateIndividual),
            "update-group" => Some(Self::UpdateGroup),
            "add-member" => Some(Self::AddMember),
            "remove-member" => Some(Self::RemoveMember),
            "create-individual-from-group" => Some(Self::CreateIndividualFromGroup),
            "delete-individual" => Some(Self::DeleteIndividual),
            "delete-group" => Some(Self::DeleteGroup),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::CreateIndividual => "create-individual",
            Self::CreateGroup => "create-group",
            Self::UpdateIndividual => "update-individual",
            Self::UpdateGroup => "update-group",
            Self::AddMember => "add-member",
            Self::RemoveMember => "remove-member",
            Self::CreateIndividualFromGroup => "create-individual-from-group",
            Self::DeleteIndividual => "delete-individual",
            Self::DeleteGroup => "delete-group",
        }
    }

    pub fn is_deletion(self) -> bool {
        matches!(self, Self::DeleteIndividual | Self::DeleteGroup)
    }
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The entity's next state, plus any derived events to append to the log.
    Upsert {
        entity: EntityDoc,
        derived: Vec<FormSubmission>,
    },
    /// The entity (and anything referencing it) must be removed.
    Delete { guid: EntityGuid },
}

/// Apply `event` to the current entity state.
pub fn apply(current: Option<&EntityDoc>, event: &FormSubmission) -> DomainResult<Transition> {
    let kind = EventKind::parse(&event.event_type)
        .ok_or_else(|| DomainError::unknown_event_type(&event.event_type))?;

    match kind {
        EventKind::CreateIndividual => create(current, event, EntityType::Individual),
        EventKind::CreateGroup => create(current, event, EntityType::Group),
        EventKind::UpdateIndividual => update(current, event, EntityType::Individual),
        EventKind::UpdateGroup => update(current, event, EntityType::Group),
        EventKind::AddMember => add_member(current, event),
        EventKind::RemoveMember => remove_member(current, event),
        EventKind::CreateIndividualFromGroup => create_from_group(current, event),
        EventKind::DeleteIndividual => delete(current, event, EntityType::Individual),
        EventKind::DeleteGroup => delete(current, event, EntityType::Group),
    }
}

fn create(
    current: Option<&EntityDoc>,
    event: &FormSubmission,
    entity_type: EntityType,
) -> DomainResult<Transition> {
    if current.is_some() {
        return Err(DomainError::conflict(format!(
            "entity {} already exists",
            event.entity_guid
        )));
    }

    let mut data = event.data.clone();
    if entity_type == EntityType::Group && data.get("members").is_none() {
        ensure_object(&mut data)?.insert("members".to_string(), Value::Array(Vec::new()));
    }

    Ok(Transition::Upsert {
        entity: EntityDoc {
            id: event.entity_guid.clone(),
            guid: event.entity_guid.clone(),
            entity_type,
            external_id: external_id_of(&data),
            data,
            version: 1,
            last_updated: event.timestamp.clone(),
            sync_level: event.sync_level,
        },
        derived: Vec::new(),
    })
}

fn update(
    current: Option<&EntityDoc>,
    event: &FormSubmission,
    entity_type: EntityType,
) -> DomainResult<Transition> {
    let current = existing(current, event, entity_type)?;

    let mut next = current.clone();
    deep_merge(&mut next.data, &event.data);
    if let Some(external_id) = external_id_of(&event.data) {
        next.external_id = Some(external_id);
    }
    bump(&mut next, event);

    Ok(Transition::Upsert {
        entity: next,
        derived: Vec::new(),
    })
}

fn add_member(current: Option<&EntityDoc>, event: &FormSubmission) -> DomainResult<Transition> {
    let current = existing(current, event, EntityType::Group)?;
    let member = required_str(&event.data, "memberGuid")?;

    let mut next = current.clone();
    let members = members_array(&mut next.data)?;
    if !members.iter().any(|m| m.as_str() == Some(&member)) {
        members.push(Value::String(member));
    }
    bump(&mut next, event);

    Ok(Transition::Upsert {
        entity: next,
        derived: Vec::new(),
    })
}

fn remove_member(current: Option<&EntityDoc>, event: &FormSubmission) -> DomainResult<Transition> {
    let current = existing(current, event, EntityType::Group)?;
    let member = required_str(&event.data, "memberGuid")?;

    let mut next = current.clone();
    members_array(&mut next.data)?.retain(|m| m.as_str() != Some(member.as_str()));
    bump(&mut next, event);

    Ok(Transition::Upsert {
        entity: next,
        derived: Vec::new(),
    })
}

/// A group spawns a new individual: the group gains a member and a derived
/// `create-individual` event is emitted for the child, carrying a
/// `parentGuid` back-reference. The originator supplies the child's guid
/// inside `data.member.guid`.
fn create_from_group(
    current: Option<&EntityDoc>,
    event: &FormSubmission,
) -> DomainResult<Transition> {
    let current = existing(current, event, EntityType::Group)?;

    let member = event
        .data
        .get("member")
        .and_then(Value::as_object)
        .ok_or_else(|| DomainError::validation("create-individual-from-group requires 'member'"))?;
    let child_guid = member
        .get("guid")
        .and_then(Value::as_str)
        .filter(|g| !g.is_empty())
        .ok_or_else(|| DomainError::validation("'member.guid' is required"))?
        .to_string();

    let mut child_data: Map<String, Value> = member.clone();
    child_data.remove("guid");
    child_data.insert(
        "parentGuid".to_string(),
        Value::String(current.guid.as_str().to_string()),
    );

    let derived = FormSubmission {
        guid: EventGuid::generate(),
        entity_guid: EntityGuid::new(child_guid.clone()),
        event_type: EventKind::CreateIndividual.tag().to_string(),
        data: Value::Object(child_data),
        timestamp: event.timestamp.clone(),
        user_id: event.user_id.clone(),
        sync_level: event.sync_level,
    };

    let mut next = current.clone();
    let members = members_array(&mut next.data)?;
    if !members.iter().any(|m| m.as_str() == Some(&child_guid)) {
        members.push(Value::String(child_guid));
    }
    bump(&mut next, event);

    Ok(Transition::Upsert {
        entity: next,
        derived: vec![derived],
    })
}

fn delete(
    current: Option<&EntityDoc>,
    event: &FormSubmission,
    entity_type: EntityType,
) -> DomainResult<Transition> {
    existing(current, event, entity_type)?;
    Ok(Transition::Delete {
        guid: event.entity_guid.clone(),
    })
}

// ── helpers ──────────────────────────────────────────────────────

fn existing<'a>(
    current: Option<&'a EntityDoc>,
    event: &FormSubmission,
    expected: EntityType,
) -> DomainResult<&'a EntityDoc> {
    let doc = current.ok_or(DomainError::NotFound)?;
    if doc.entity_type != expected {
        return Err(DomainError::validation(format!(
            "'{}' targets a {:?}, but {} is a {:?}",
            event.event_type, expected, doc.guid, doc.entity_type
        )));
    }
    Ok(doc)
}

fn bump(doc: &mut EntityDoc, event: &FormSubmission) {
    doc.version += 1;
    doc.last_updated = event.timestamp.clone();
}

fn external_id_of(data: &Value) -> Option<String> {
    data.get("externalId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn required_str(data: &Value, key: &str) -> DomainResult<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DomainError::validation(format!("'{key}' is required")))
}

fn ensure_object<'a>(value: &'a mut Value) -> DomainResult<&'a mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| DomainError::validation("event data must be an object"))
}

fn members_array<'a>(data: &'a mut Value) -> DomainResult<&'a mut Vec<Value>> {
    let obj = ensure_object(data)?;
    obj.entry("members".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    obj.get_mut("members")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| DomainError::validation("'members' must be an array"))
}

/// Object keys from `patch` merge recursively into `base`; everything else
/// (arrays, scalars, null) replaces wholesale.
fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}
