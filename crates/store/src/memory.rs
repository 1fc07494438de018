//! Embedded in-memory backend.
//!
//! The single-process client store. Isolation comes from construction: each
//! tenant gets its own adapter instance owning its own tables, the moral
//! equivalent of a tenant-prefixed embedded database. Writes are
//! single-writer per tenant by construction, so plain `RwLock`s suffice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, TenantId};
use fieldbook_domain::{AuditLogEntry, DuplicateCandidate, EntityPair, FormSubmission, SyncCursor};
use tracing::debug;

use crate::adapter::{
    AuthTokenStorageAdapter, EntityStorageAdapter, EventPage, EventStorageAdapter,
};
use crate::error::{StorageError, StorageResult};
use crate::search::SearchCriteria;
use crate::subtree::collect_subtree;

#[derive(Debug, Default)]
struct EventTables {
    events: Vec<FormSubmission>,
    audit: Vec<AuditLogEntry>,
    merkle_root: String,
    cursors: HashMap<SyncCursor, String>,
}

/// In-memory event-log backend for one tenant.
#[derive(Debug)]
pub struct MemoryEventStorageAdapter {
    tenant: TenantId,
    initialized: AtomicBool,
    tables: RwLock<EventTables>,
}

impl MemoryEventStorageAdapter {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            initialized: AtomicBool::new(false),
            tables: RwLock::new(EventTables::default()),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn guard(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, EventTables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::backend("lock poisoned"))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, EventTables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::backend("lock poisoned"))
    }
}

#[async_trait]
impl EventStorageAdapter for MemoryEventStorageAdapter {
    async fn initialize(&self) -> StorageResult<()> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn save_events(&self, events: &[FormSubmission]) -> StorageResult<Vec<EventGuid>> {
        self.guard()?;
        let mut tables = self.write()?;

        // Validate the whole batch before touching the log: the batch is
        // atomic, a duplicate anywhere rejects everything.
        let mut seen = std::collections::HashSet::new();
        for event in events {
            if tables.events.iter().any(|e| e.guid == event.guid)
                || !seen.insert(event.guid.as_str())
            {
                return Err(StorageError::DuplicateEvent(event.guid.to_string()));
            }
        }

        tables.events.extend_from_slice(events);
        Ok(events.iter().map(|e| e.guid.clone()).collect())
    }

    async fn get_events(&self) -> StorageResult<Vec<FormSubmission>> {
        self.guard()?;
        Ok(self.read()?.events.clone())
    }

    async fn get_events_since(&self, since: &str) -> StorageResult<Vec<FormSubmission>> {
        self.guard()?;
        let mut events: Vec<FormSubmission> = self
            .read()?
            .events
            .iter()
            .filter(|e| e.timestamp.as_str() > since)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    async fn get_events_since_paginated(
        &self,
        since: &str,
        limit: usize,
    ) -> StorageResult<EventPage> {
        let all = self.get_events_since(since).await?;
        let remainder = all.len() > limit;
        let events: Vec<FormSubmission> = all.into_iter().take(limit).collect();
        // A full page yields a cursor only when events remain past it; a page
        // that drains the set ends the walk even at exactly `limit` events.
        let next_cursor = if events.len() == limit && remainder {
            events.last().map(|e| e.timestamp.clone())
        } else {
            None
        };
        Ok(EventPage {
            events,
            next_cursor,
        })
    }

    async fn get_events_for_entity_subtree(
        &self,
        root: &EntityGuid,
        since_inclusive: &str,
    ) -> StorageResult<Vec<FormSubmission>> {
        self.guard()?;
        let tables = self.read()?;
        Ok(collect_subtree(&tables.events, root.as_str(), since_inclusive))
    }

    async fn is_event_existed(&self, guid: &EventGuid) -> StorageResult<bool> {
        self.guard()?;
        Ok(self.read()?.events.iter().any(|e| e.guid == *guid))
    }

    async fn update_event_sync_level(
        &self,
        guid: &EventGuid,
        level: SyncLevel,
    ) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        if let Some(event) = tables.events.iter_mut().find(|e| e.guid == *guid) {
            if event.sync_level.can_advance_to(level) {
                event.sync_level = level;
            } else {
                debug!(tenant = %self.tenant, %guid, from = ?event.sync_level, to = ?level,
                    "ignoring sync-level downgrade");
            }
        }
        Ok(())
    }

    async fn update_sync_level_from_events(
        &self,
        events: &[FormSubmission],
    ) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        for incoming in events {
            if let Some(event) = tables.events.iter_mut().find(|e| e.guid == incoming.guid) {
                if event.sync_level.can_advance_to(incoming.sync_level) {
                    event.sync_level = incoming.sync_level;
                } else {
                    debug!(tenant = %self.tenant, guid = %incoming.guid,
                        from = ?event.sync_level, to = ?incoming.sync_level,
                        "ignoring sync-level downgrade");
                }
            }
        }
        Ok(())
    }

    async fn save_audit_logs(&self, entries: &[AuditLogEntry]) -> StorageResult<()> {
        self.guard()?;
        self.write()?.audit.extend_from_slice(entries);
        Ok(())
    }

    async fn get_audit_logs_since(&self, since: &str) -> StorageResult<Vec<AuditLogEntry>> {
        self.guard()?;
        let mut entries: Vec<AuditLogEntry> = self
            .read()?
            .audit
            .iter()
            .filter(|e| e.timestamp.as_str() > since)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    async fn get_audit_trail_by_entity_guid(
        &self,
        entity_guid: &EntityGuid,
    ) -> StorageResult<Vec<AuditLogEntry>> {
        self.guard()?;
        let mut entries: Vec<AuditLogEntry> = self
            .read()?
            .audit
            .iter()
            .filter(|e| e.entity_guid == *entity_guid)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn update_audit_log_sync_level(
        &self,
        entity_guid: &EntityGuid,
        level: SyncLevel,
    ) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        for entry in tables
            .audit
            .iter_mut()
            .filter(|e| e.entity_guid == *entity_guid)
        {
            if entry.sync_level.can_advance_to(level) {
                entry.sync_level = level;
            }
        }
        Ok(())
    }

    async fn save_merkle_root(&self, root: &str) -> StorageResult<()> {
        self.guard()?;
        self.write()?.merkle_root = root.to_string();
        Ok(())
    }

    async fn get_merkle_root(&self) -> StorageResult<String> {
        self.guard()?;
        Ok(self.read()?.merkle_root.clone())
    }

    async fn get_sync_cursor(&self, cursor: SyncCursor) -> StorageResult<String> {
        self.guard()?;
        Ok(self
            .read()?
            .cursors
            .get(&cursor)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_sync_cursor(&self, cursor: SyncCursor, timestamp: &str) -> StorageResult<()> {
        self.guard()?;
        self.write()?.cursors.insert(cursor, timestamp.to_string());
        Ok(())
    }

    async fn clear_store(&self) -> StorageResult<()> {
        self.guard()?;
        *self.write()? = EventTables::default();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EntityTables {
    pairs: Vec<EntityPair>,
    duplicates: Vec<DuplicateCandidate>,
}

/// In-memory entity backend for one tenant.
#[derive(Debug)]
pub struct MemoryEntityStorageAdapter {
    tenant: TenantId,
    initialized: AtomicBool,
    tables: RwLock<EntityTables>,
}

impl MemoryEntityStorageAdapter {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            initialized: AtomicBool::new(false),
            tables: RwLock::new(EntityTables::default()),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn guard(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, EntityTables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::backend("lock poisoned"))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, EntityTables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::backend("lock poisoned"))
    }
}

fn pair_matches_id(pair: &EntityPair, id_or_guid: &str) -> bool {
    pair.guid.as_str() == id_or_guid || pair.modified.id.as_str() == id_or_guid
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl EntityStorageAdapter for MemoryEntityStorageAdapter {
    async fn initialize(&self) -> StorageResult<()> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn save_entity(&self, pair: &EntityPair) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        match tables.pairs.iter_mut().find(|p| p.guid == pair.guid) {
            Some(existing) => *existing = pair.clone(),
            None => tables.pairs.push(pair.clone()),
        }
        Ok(())
    }

    async fn get_entity(&self, id_or_guid: &str) -> StorageResult<Option<EntityPair>> {
        self.guard()?;
        Ok(self
            .read()?
            .pairs
            .iter()
            .find(|p| pair_matches_id(p, id_or_guid))
            .cloned())
    }

    async fn get_entity_by_external_id(
        &self,
        external_id: &str,
    ) -> StorageResult<Option<EntityPair>> {
        self.guard()?;
        Ok(self
            .read()?
            .pairs
            .iter()
            .find(|p| p.modified.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn get_all_entities(&self) -> StorageResult<Vec<EntityPair>> {
        self.guard()?;
        Ok(self.read()?.pairs.clone())
    }

    async fn get_modified_entities_since(&self, since: &str) -> StorageResult<Vec<EntityPair>> {
        self.guard()?;
        Ok(self
            .read()?
            .pairs
            .iter()
            .filter(|p| p.modified.last_updated.as_str() > since)
            .cloned()
            .collect())
    }

    async fn delete_entity(&self, id: &str) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        let Some(position) = tables.pairs.iter().position(|p| pair_matches_id(p, id)) else {
            return Ok(());
        };
        let removed = tables.pairs.remove(position);
        let guid = removed.guid.as_str().to_string();
        tables.duplicates.retain(|d| !d.references(&guid));
        Ok(())
    }

    async fn mark_entity_as_synced(&self, id: &str) -> StorageResult<Option<EntityPair>> {
        self.guard()?;
        let mut tables = self.write()?;
        let Some(pair) = tables.pairs.iter_mut().find(|p| pair_matches_id(p, id)) else {
            return Ok(None);
        };
        let stamp = now_stamp();
        pair.modified.last_updated = stamp;
        pair.initial = pair.modified.clone();
        Ok(Some(pair.clone()))
    }

    async fn search_entities(&self, criteria: &SearchCriteria) -> StorageResult<Vec<EntityPair>> {
        self.guard()?;
        Ok(self
            .read()?
            .pairs
            .iter()
            .filter(|p| criteria.matches(p))
            .cloned()
            .collect())
    }

    async fn save_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        for pair in pairs {
            let key = pair.key();
            if !tables.duplicates.iter().any(|d| d.key() == key) {
                tables.duplicates.push(pair.clone());
            }
        }
        Ok(())
    }

    async fn get_potential_duplicates(&self) -> StorageResult<Vec<DuplicateCandidate>> {
        self.guard()?;
        Ok(self.read()?.duplicates.clone())
    }

    async fn resolve_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> StorageResult<()> {
        self.guard()?;
        let mut tables = self.write()?;
        for pair in pairs {
            let key = pair.key();
            tables.duplicates.retain(|d| d.key() != key);
        }
        Ok(())
    }

    async fn clear_store(&self) -> StorageResult<()> {
        self.guard()?;
        *self.write()? = EntityTables::default();
        Ok(())
    }

    async fn close_connection(&self) -> StorageResult<()> {
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

/// In-memory token store for one tenant's client.
#[derive(Debug, Default)]
pub struct MemoryAuthTokenAdapter {
    initialized: AtomicBool,
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryAuthTokenAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }
}

#[async_trait]
impl AuthTokenStorageAdapter for MemoryAuthTokenAdapter {
    async fn initialize(&self) -> StorageResult<()> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn save_token(&self, name: &str, token: &str) -> StorageResult<()> {
        self.guard()?;
        self.tokens
            .write()
            .map_err(|_| StorageError::backend("lock poisoned"))?
            .insert(name.to_string(), token.to_string());
        Ok(())
    }

    async fn get_token(&self, name: &str) -> StorageResult<Option<String>> {
        self.guard()?;
        Ok(self
            .tokens
            .read()
            .map_err(|_| StorageError::backend("lock poisoned"))?
            .get(name)
            .cloned())
    }

    async fn clear_tokens(&self) -> StorageResult<()> {
        self.guard()?;
        self.tokens
            .write()
            .map_err(|_| StorageError::backend("lock poisoned"))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_core::UserId;
    use fieldbook_domain::{EntityDoc, EntityType};
    use serde_json::json;

    fn event(guid: &str, entity: &str, ts: &str) -> FormSubmission {
        FormSubmission {
            guid: EventGuid::new(guid),
            entity_guid: EntityGuid::new(entity),
            event_type: "create-individual".to_string(),
            data: json!({"name": guid}),
            timestamp: ts.to_string(),
            user_id: UserId::new("u1"),
            sync_level: SyncLevel::Local,
        }
    }

    fn pair(guid: &str) -> EntityPair {
        EntityPair::from_snapshot(EntityDoc {
            id: EntityGuid::new(guid),
            guid: EntityGuid::new(guid),
            entity_type: EntityType::Individual,
            data: json!({"name": guid}),
            version: 1,
            last_updated: "2024-01-01T00:00:00Z".into(),
            external_id: None,
            sync_level: SyncLevel::Local,
        })
    }

    async fn event_store() -> MemoryEventStorageAdapter {
        let store = MemoryEventStorageAdapter::new(TenantId::default());
        store.initialize().await.unwrap();
        store
    }

    async fn entity_store() -> MemoryEntityStorageAdapter {
        let store = MemoryEntityStorageAdapter::new(TenantId::default());
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn uninitialized_store_is_rejected() {
        let store = MemoryEventStorageAdapter::new(TenantId::default());
        assert_eq!(
            store.get_events().await.unwrap_err(),
            StorageError::NotInitialized
        );
    }

    #[tokio::test]
    async fn duplicate_guid_rejects_the_whole_batch() {
        let store = event_store().await;
        store
            .save_events(&[event("e1", "p1", "2024-01-01T00:00:00Z")])
            .await
            .unwrap();

        let err = store
            .save_events(&[
                event("e2", "p1", "2024-01-02T00:00:00Z"),
                event("e1", "p1", "2024-01-03T00:00:00Z"),
            ])
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::DuplicateEvent("e1".into()));

        // Nothing from the failed batch landed.
        assert_eq!(store.get_events().await.unwrap().len(), 1);
        assert!(!store.is_event_existed(&EventGuid::new("e2")).await.unwrap());
    }

    #[tokio::test]
    async fn events_since_is_strictly_greater() {
        let store = event_store().await;
        store
            .save_events(&[
                event("e1", "p1", "2024-01-01T00:00:00Z"),
                event("e2", "p1", "2024-01-02T00:00:00Z"),
            ])
            .await
            .unwrap();

        let since = store.get_events_since("2024-01-01T00:00:00Z").await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].guid.as_str(), "e2");

        assert_eq!(store.get_events_since("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pagination_cursor_walks_the_log() {
        let store = event_store().await;
        store
            .save_events(&[
                event("e1", "p1", "2024-01-01T00:00:00Z"),
                event("e2", "p1", "2024-01-02T00:00:00Z"),
                event("e3", "p1", "2024-01-03T00:00:00Z"),
            ])
            .await
            .unwrap();

        let page1 = store.get_events_since_paginated("", 1).await.unwrap();
        assert_eq!(page1.events[0].guid.as_str(), "e1");
        assert_eq!(page1.next_cursor.as_deref(), Some("2024-01-01T00:00:00Z"));

        let page2 = store
            .get_events_since_paginated(page1.next_cursor.as_deref().unwrap(), 1)
            .await
            .unwrap();
        assert_eq!(page2.events[0].guid.as_str(), "e2");
        assert_eq!(page2.next_cursor.as_deref(), Some("2024-01-02T00:00:00Z"));

        let page3 = store
            .get_events_since_paginated(page2.next_cursor.as_deref().unwrap(), 1)
            .await
            .unwrap();
        assert_eq!(page3.events[0].guid.as_str(), "e3");
        assert_eq!(page3.next_cursor, None);
    }

    #[tokio::test]
    async fn sync_level_never_regresses() {
        let store = event_store().await;
        store
            .save_events(&[event("e1", "p1", "2024-01-01T00:00:00Z")])
            .await
            .unwrap();

        let guid = EventGuid::new("e1");
        store
            .update_event_sync_level(&guid, SyncLevel::Remote)
            .await
            .unwrap();
        store
            .update_event_sync_level(&guid, SyncLevel::Local)
            .await
            .unwrap();

        let events = store.get_events().await.unwrap();
        assert_eq!(events[0].sync_level, SyncLevel::Remote);
    }

    #[tokio::test]
    async fn merkle_root_and_cursors_round_trip() {
        let store = event_store().await;
        assert_eq!(store.get_merkle_root().await.unwrap(), "");
        store.save_merkle_root("abc123").await.unwrap();
        assert_eq!(store.get_merkle_root().await.unwrap(), "abc123");
        store.save_merkle_root("").await.unwrap();
        assert_eq!(store.get_merkle_root().await.unwrap(), "");

        assert_eq!(
            store.get_sync_cursor(SyncCursor::LastRemoteSync).await.unwrap(),
            ""
        );
        store
            .set_sync_cursor(SyncCursor::LastRemoteSync, "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        store
            .set_sync_cursor(SyncCursor::LastRemoteSync, "2024-02-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(
            store.get_sync_cursor(SyncCursor::LastRemoteSync).await.unwrap(),
            "2024-02-01T00:00:00Z"
        );
        // The other cursors are independent.
        assert_eq!(
            store.get_sync_cursor(SyncCursor::LastLocalSync).await.unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn audit_trail_is_descending_by_timestamp() {
        let store = event_store().await;
        let e1 = event("e1", "p1", "2024-01-01T00:00:00Z");
        let e2 = event("e2", "p1", "2024-01-02T00:00:00Z");
        store
            .save_audit_logs(&[
                AuditLogEntry::for_application(&e1, "sig1"),
                AuditLogEntry::for_application(&e2, "sig2"),
            ])
            .await
            .unwrap();

        let trail = store
            .get_audit_trail_by_entity_guid(&EntityGuid::new("p1"))
            .await
            .unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event_guid.as_str(), "e2");
        assert_eq!(trail[1].event_guid.as_str(), "e1");
    }

    #[tokio::test]
    async fn delete_entity_purges_duplicate_pairs() {
        let store = entity_store().await;
        store.save_entity(&pair("a")).await.unwrap();
        store.save_entity(&pair("b")).await.unwrap();
        store.save_entity(&pair("c")).await.unwrap();
        store
            .save_potential_duplicates(&[
                DuplicateCandidate::new("a", "b"),
                DuplicateCandidate::new("b", "c"),
            ])
            .await
            .unwrap();

        store.delete_entity("a").await.unwrap();

        assert!(store.get_entity("a").await.unwrap().is_none());
        let remaining = store.get_potential_duplicates().await.unwrap();
        assert_eq!(remaining, vec![DuplicateCandidate::new("b", "c")]);
    }

    #[tokio::test]
    async fn duplicate_pairs_are_idempotent_and_unordered() {
        let store = entity_store().await;
        let p = DuplicateCandidate::new("a", "b");
        store
            .save_potential_duplicates(&[p.clone(), p.clone()])
            .await
            .unwrap();
        store
            .save_potential_duplicates(&[DuplicateCandidate::new("b", "a")])
            .await
            .unwrap();
        assert_eq!(store.get_potential_duplicates().await.unwrap().len(), 1);

        store
            .resolve_potential_duplicates(&[DuplicateCandidate::new("b", "a")])
            .await
            .unwrap();
        assert!(store.get_potential_duplicates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_entity_as_synced_levels_the_pair() {
        let store = entity_store().await;
        let mut p = pair("a");
        p.modified.version = 4;
        p.modified.data = json!({"name": "renamed"});
        store.save_entity(&p).await.unwrap();

        let synced = store.mark_entity_as_synced("a").await.unwrap().unwrap();
        assert_eq!(synced.initial, synced.modified);
        assert_eq!(synced.initial.version, 4);

        let reloaded = store.get_entity("a").await.unwrap().unwrap();
        assert_eq!(reloaded.initial, reloaded.modified);
    }

    #[tokio::test]
    async fn tenant_stores_are_isolated() {
        let t1 = MemoryEntityStorageAdapter::new(TenantId::new("t1"));
        let t2 = MemoryEntityStorageAdapter::new(TenantId::new("t2"));
        t1.initialize().await.unwrap();
        t2.initialize().await.unwrap();

        let mut p1 = pair("g");
        p1.modified.data = json!({"name": "tenant-one"});
        p1.initial.data = p1.modified.data.clone();
        let mut p2 = pair("g");
        p2.modified.data = json!({"name": "tenant-two"});
        p2.initial.data = p2.modified.data.clone();

        t1.save_entity(&p1).await.unwrap();
        t2.save_entity(&p2).await.unwrap();

        assert_ne!(
            t1.get_entity("g").await.unwrap().unwrap().modified.data,
            t2.get_entity("g").await.unwrap().unwrap().modified.data
        );

        t1.clear_store().await.unwrap();
        assert!(t1.get_entity("g").await.unwrap().is_none());
        assert!(t2.get_entity("g").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn auth_tokens_round_trip() {
        let store = MemoryAuthTokenAdapter::new();
        store.initialize().await.unwrap();
        assert_eq!(store.get_token("access").await.unwrap(), None);
        store.save_token("access", "jwt-1").await.unwrap();
        store.save_token("access", "jwt-2").await.unwrap();
        assert_eq!(
            store.get_token("access").await.unwrap().as_deref(),
            Some("jwt-2")
        );
        store.clear_tokens().await.unwrap();
        assert_eq!(store.get_token("access").await.unwrap(), None);
    }
}
