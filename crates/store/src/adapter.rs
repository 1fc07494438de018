//! The storage-adapter contract consumed by the engine.
//!
//! Every implementation is scoped to a single tenant at construction time;
//! nothing below the trait boundary can cross tenants. All operations are
//! async: each call is a suspension point for the cooperative,
//! single-logical-writer-per-tenant scheduling model.

use async_trait::async_trait;
use fieldbook_core::{EntityGuid, EventGuid, SyncLevel};
use fieldbook_domain::{AuditLogEntry, DuplicateCandidate, EntityPair, FormSubmission, SyncCursor};

use crate::error::StorageResult;
use crate::search::SearchCriteria;

/// One page of events plus the cursor for the next page.
///
/// `next_cursor` is the last returned event's timestamp when the page is
/// full, `None` when this page exhausted the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub events: Vec<FormSubmission>,
    pub next_cursor: Option<String>,
}

/// Durable storage for the event log, audit log, Merkle root, and cursors.
#[async_trait]
pub trait EventStorageAdapter: Send + Sync {
    /// Idempotent schema setup.
    async fn initialize(&self) -> StorageResult<()>;

    /// Atomic batch insert. A duplicate `guid` fails the whole batch with
    /// `StorageError::DuplicateEvent`.
    async fn save_events(&self, events: &[FormSubmission]) -> StorageResult<Vec<EventGuid>>;

    /// The full log, in insertion order.
    async fn get_events(&self) -> StorageResult<Vec<FormSubmission>>;

    /// Events strictly after `since`, ascending by timestamp. The empty
    /// string means "from the beginning".
    async fn get_events_since(&self, since: &str) -> StorageResult<Vec<FormSubmission>>;

    /// Paginated variant of [`get_events_since`](Self::get_events_since).
    async fn get_events_since_paginated(
        &self,
        since: &str,
        limit: usize,
    ) -> StorageResult<EventPage>;

    /// Events for `root` and every transitive descendant under the
    /// `data.parentGuid` relation, filtered to `timestamp >= since`
    /// (inclusive), ascending by timestamp. Terminates on cyclic links.
    async fn get_events_for_entity_subtree(
        &self,
        root: &EntityGuid,
        since_inclusive: &str,
    ) -> StorageResult<Vec<FormSubmission>>;

    async fn is_event_existed(&self, guid: &EventGuid) -> StorageResult<bool>;

    /// Advance one event's sync level. Downgrades are ignored.
    async fn update_event_sync_level(
        &self,
        guid: &EventGuid,
        level: SyncLevel,
    ) -> StorageResult<()>;

    /// Advance stored events' sync levels to match the batch.
    async fn update_sync_level_from_events(
        &self,
        events: &[FormSubmission],
    ) -> StorageResult<()>;

    /// Atomic batch append of audit entries.
    async fn save_audit_logs(&self, entries: &[AuditLogEntry]) -> StorageResult<()>;

    /// Audit entries strictly after `since`, ascending by timestamp.
    async fn get_audit_logs_since(&self, since: &str) -> StorageResult<Vec<AuditLogEntry>>;

    /// Full audit trail for one entity, descending by timestamp.
    async fn get_audit_trail_by_entity_guid(
        &self,
        entity_guid: &EntityGuid,
    ) -> StorageResult<Vec<AuditLogEntry>>;

    /// Advance the sync level of every audit entry for `entity_guid`.
    async fn update_audit_log_sync_level(
        &self,
        entity_guid: &EntityGuid,
        level: SyncLevel,
    ) -> StorageResult<()>;

    /// Replace the persisted Merkle root; the empty string clears it.
    async fn save_merkle_root(&self, root: &str) -> StorageResult<()>;

    /// The persisted root, or `""` when none is stored.
    async fn get_merkle_root(&self) -> StorageResult<String>;

    /// Current value of a sync cursor, `""` when never set.
    async fn get_sync_cursor(&self, cursor: SyncCursor) -> StorageResult<String>;

    /// Replace a sync cursor (upsert semantics).
    async fn set_sync_cursor(&self, cursor: SyncCursor, timestamp: &str) -> StorageResult<()>;

    /// Destructive, tenant-scoped wipe of events, audit, root, and cursors.
    async fn clear_store(&self) -> StorageResult<()>;
}

/// Durable storage for entity pairs and duplicate candidates.
#[async_trait]
pub trait EntityStorageAdapter: Send + Sync {
    /// Idempotent schema setup.
    async fn initialize(&self) -> StorageResult<()>;

    /// Upsert by guid.
    async fn save_entity(&self, pair: &EntityPair) -> StorageResult<()>;

    /// Lookup by `id` or `guid`.
    async fn get_entity(&self, id_or_guid: &str) -> StorageResult<Option<EntityPair>>;

    async fn get_entity_by_external_id(
        &self,
        external_id: &str,
    ) -> StorageResult<Option<EntityPair>>;

    async fn get_all_entities(&self) -> StorageResult<Vec<EntityPair>>;

    /// Pairs whose `modified.last_updated` is strictly after `since`.
    async fn get_modified_entities_since(&self, since: &str) -> StorageResult<Vec<EntityPair>>;

    /// Remove the pair and purge duplicate candidates referencing it.
    async fn delete_entity(&self, id: &str) -> StorageResult<()>;

    /// Copy `modified` into `initial` and stamp `last_updated`. Returns the
    /// updated pair, or `None` when the entity does not exist.
    async fn mark_entity_as_synced(&self, id: &str) -> StorageResult<Option<EntityPair>>;

    /// Pairs where `initial` or `modified` satisfies every clause.
    async fn search_entities(&self, criteria: &SearchCriteria) -> StorageResult<Vec<EntityPair>>;

    /// Idempotent batch insert; pair identity ignores order.
    async fn save_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> StorageResult<()>;

    async fn get_potential_duplicates(&self) -> StorageResult<Vec<DuplicateCandidate>>;

    /// Remove exactly the listed pairs.
    async fn resolve_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> StorageResult<()>;

    /// Destructive, tenant-scoped wipe of pairs and duplicate candidates.
    async fn clear_store(&self) -> StorageResult<()>;

    /// Release backend resources. Subsequent calls fail.
    async fn close_connection(&self) -> StorageResult<()>;
}

/// Client-side persistence for opaque auth tokens (spec'd transport
/// credentials). The server backend deliberately has no implementation.
#[async_trait]
pub trait AuthTokenStorageAdapter: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn save_token(&self, name: &str, token: &str) -> StorageResult<()>;
    async fn get_token(&self, name: &str) -> StorageResult<Option<String>>;
    async fn clear_tokens(&self) -> StorageResult<()>;
}
