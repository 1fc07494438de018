//! The event store: exclusive owner of the event log, audit log, Merkle
//! root, and sync cursors.

use std::sync::Arc;

use fieldbook_core::{EntityGuid, EventGuid, SyncLevel};
use fieldbook_domain::{AuditLogEntry, FormSubmission, SyncCursor};
use fieldbook_merkle::{MerkleTree, Proof, verify};
use fieldbook_store::{EventPage, EventStorageAdapter};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Mediates every event-log read and write through its adapter and keeps the
/// in-memory Merkle tree in lockstep with the persisted log.
///
/// An event becomes visible to readers only after its recomputed root has
/// been persisted; `save_event` does not return success before that point.
/// The store itself is not a mutual-exclusion mechanism: the tenant's
/// single-logical-writer model is what keeps appends serialized.
pub struct EventStore {
    adapter: Arc<dyn EventStorageAdapter>,
    tree: RwLock<MerkleTree>,
}

impl EventStore {
    pub fn new(adapter: Arc<dyn EventStorageAdapter>) -> Self {
        Self {
            adapter,
            tree: RwLock::new(MerkleTree::default()),
        }
    }

    /// Set up the adapter and rebuild the tree from the persisted log.
    ///
    /// The persisted root reflects the last successful write; the rebuilt
    /// tree reflects the actual log. On mismatch the recomputed root wins
    /// and is written back (self-healing).
    pub async fn initialize(&self) -> EngineResult<()> {
        self.adapter.initialize().await?;

        let events = self.adapter.get_events().await?;
        let tree = MerkleTree::from_events(&events);
        let computed = tree.root_hex();

        let persisted = self.adapter.get_merkle_root().await?;
        if persisted != computed {
            if !persisted.is_empty() {
                warn!(%persisted, %computed, "merkle root mismatch on initialize; recomputed root wins");
            }
            self.adapter.save_merkle_root(&computed).await?;
        }

        *self.tree.write().await = tree;
        Ok(())
    }

    /// Append one event, then recompute and persist the root.
    pub async fn save_event(&self, event: &FormSubmission) -> EngineResult<EventGuid> {
        if event.guid.is_empty() {
            return Err(EngineError::Validation("event guid must not be empty".into()));
        }
        if self.adapter.is_event_existed(&event.guid).await? {
            return Err(EngineError::DuplicateEvent(event.guid.to_string()));
        }

        self.adapter.save_events(std::slice::from_ref(event)).await?;
        self.rebuild_tree().await?;
        Ok(event.guid.clone())
    }

    /// Append a batch atomically, then recompute and persist the root once.
    pub async fn save_events(&self, events: &[FormSubmission]) -> EngineResult<Vec<EventGuid>> {
        for event in events {
            if event.guid.is_empty() {
                return Err(EngineError::Validation("event guid must not be empty".into()));
            }
        }
        let guids = self.adapter.save_events(events).await?;
        self.rebuild_tree().await?;
        Ok(guids)
    }

    /// Full O(N) rebuild from the persisted log. The persisted form is
    /// authoritative, so restarts converge on the same root.
    async fn rebuild_tree(&self) -> EngineResult<()> {
        let events = self.adapter.get_events().await?;
        let tree = MerkleTree::from_events(&events);
        self.adapter.save_merkle_root(&tree.root_hex()).await?;
        *self.tree.write().await = tree;
        Ok(())
    }

    /// Current in-memory root (`""` for an empty log).
    pub async fn merkle_root(&self) -> String {
        self.tree.read().await.root_hex()
    }

    /// Inclusion proof for `event` against the in-memory tree.
    pub async fn get_proof(&self, event: &FormSubmission) -> Proof {
        self.tree.read().await.proof_for(event)
    }

    /// Verify `event` with `proof` against the in-memory root.
    pub async fn verify_event(&self, event: &FormSubmission, proof: &Proof) -> bool {
        verify(event, proof, &self.merkle_root().await)
    }

    // ── log reads ────────────────────────────────────────────────

    pub async fn get_events(&self) -> EngineResult<Vec<FormSubmission>> {
        Ok(self.adapter.get_events().await?)
    }

    pub async fn get_events_since(&self, since: &str) -> EngineResult<Vec<FormSubmission>> {
        Ok(self.adapter.get_events_since(since).await?)
    }

    pub async fn get_events_since_paginated(
        &self,
        since: &str,
        limit: usize,
    ) -> EngineResult<EventPage> {
        Ok(self.adapter.get_events_since_paginated(since, limit).await?)
    }

    pub async fn get_events_for_entity_subtree(
        &self,
        root: &EntityGuid,
        since_inclusive: &str,
    ) -> EngineResult<Vec<FormSubmission>> {
        Ok(self
            .adapter
            .get_events_for_entity_subtree(root, since_inclusive)
            .await?)
    }

    pub async fn is_event_existed(&self, guid: &EventGuid) -> EngineResult<bool> {
        Ok(self.adapter.is_event_existed(guid).await?)
    }

    // ── sync-level transitions ───────────────────────────────────

    pub async fn update_event_sync_level(
        &self,
        guid: &EventGuid,
        level: SyncLevel,
    ) -> EngineResult<()> {
        Ok(self.adapter.update_event_sync_level(guid, level).await?)
    }

    pub async fn update_sync_level_from_events(
        &self,
        events: &[FormSubmission],
    ) -> EngineResult<()> {
        Ok(self.adapter.update_sync_level_from_events(events).await?)
    }

    // ── audit log ────────────────────────────────────────────────

    pub async fn save_audit_logs(&self, entries: &[AuditLogEntry]) -> EngineResult<()> {
        Ok(self.adapter.save_audit_logs(entries).await?)
    }

    pub async fn get_audit_logs_since(&self, since: &str) -> EngineResult<Vec<AuditLogEntry>> {
        Ok(self.adapter.get_audit_logs_since(since).await?)
    }

    pub async fn get_audit_trail_by_entity_guid(
        &self,
        entity_guid: &EntityGuid,
    ) -> EngineResult<Vec<AuditLogEntry>> {
        Ok(self.adapter.get_audit_trail_by_entity_guid(entity_guid).await?)
    }

    pub async fn update_audit_log_sync_level(
        &self,
        entity_guid: &EntityGuid,
        level: SyncLevel,
    ) -> EngineResult<()> {
        Ok(self
            .adapter
            .update_audit_log_sync_level(entity_guid, level)
            .await?)
    }

    // ── sync cursors ─────────────────────────────────────────────

    pub async fn sync_cursor(&self, cursor: SyncCursor) -> EngineResult<String> {
        Ok(self.adapter.get_sync_cursor(cursor).await?)
    }

    pub async fn set_sync_cursor(
        &self,
        cursor: SyncCursor,
        timestamp: &str,
    ) -> EngineResult<()> {
        Ok(self.adapter.set_sync_cursor(cursor, timestamp).await?)
    }

    /// Destructive, tenant-scoped wipe.
    pub async fn clear_store(&self) -> EngineResult<()> {
        self.adapter.clear_store().await?;
        *self.tree.write().await = MerkleTree::default();
        Ok(())
    }
}
