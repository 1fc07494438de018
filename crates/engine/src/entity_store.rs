//! The entity store: exclusive owner of entity pairs, the duplicate-candidate
//! queue, and the external-id index.

use std::sync::Arc;

use fieldbook_domain::{DuplicateCandidate, EntityDoc, EntityPair};
use fieldbook_store::{EntityStorageAdapter, SearchCriteria};
use serde_json::Value;

use crate::error::EngineResult;

pub struct EntityStore {
    adapter: Arc<dyn EntityStorageAdapter>,
}

impl EntityStore {
    pub fn new(adapter: Arc<dyn EntityStorageAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn initialize(&self) -> EngineResult<()> {
        Ok(self.adapter.initialize().await?)
    }

    /// Persist a pair, normalizing a first save: when no `initial` exists
    /// yet, both sides carry the same snapshot.
    pub async fn save_entity(
        &self,
        initial: Option<EntityDoc>,
        modified: EntityDoc,
    ) -> EngineResult<EntityPair> {
        let pair = match initial {
            Some(initial) => EntityPair::new(initial, modified)?,
            None => EntityPair::from_snapshot(modified),
        };
        self.adapter.save_entity(&pair).await?;
        Ok(pair)
    }

    pub async fn get_entity(&self, id_or_guid: &str) -> EngineResult<Option<EntityPair>> {
        Ok(self.adapter.get_entity(id_or_guid).await?)
    }

    pub async fn get_entity_by_external_id(
        &self,
        external_id: &str,
    ) -> EngineResult<Option<EntityPair>> {
        Ok(self.adapter.get_entity_by_external_id(external_id).await?)
    }

    pub async fn get_all_entities(&self) -> EngineResult<Vec<EntityPair>> {
        Ok(self.adapter.get_all_entities().await?)
    }

    pub async fn get_modified_entities_since(&self, since: &str) -> EngineResult<Vec<EntityPair>> {
        Ok(self.adapter.get_modified_entities_since(since).await?)
    }

    /// Remove the pair; duplicate candidates referencing it go with it.
    pub async fn delete_entity(&self, id: &str) -> EngineResult<()> {
        Ok(self.adapter.delete_entity(id).await?)
    }

    /// Server confirmed this entity: fold `modified` into `initial`.
    pub async fn mark_entity_as_synced(&self, id: &str) -> EngineResult<Option<EntityPair>> {
        Ok(self.adapter.mark_entity_as_synced(id).await?)
    }

    /// Compile raw criteria once and evaluate them against every pair.
    pub async fn search_entities(&self, criteria: &Value) -> EngineResult<Vec<EntityPair>> {
        let compiled = SearchCriteria::compile(criteria)?;
        Ok(self.adapter.search_entities(&compiled).await?)
    }

    // ── duplicate-candidate queue ────────────────────────────────

    pub async fn save_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> EngineResult<()> {
        Ok(self.adapter.save_potential_duplicates(pairs).await?)
    }

    pub async fn get_potential_duplicates(&self) -> EngineResult<Vec<DuplicateCandidate>> {
        Ok(self.adapter.get_potential_duplicates().await?)
    }

    pub async fn resolve_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> EngineResult<()> {
        Ok(self.adapter.resolve_potential_duplicates(pairs).await?)
    }

    /// How many unresolved pairs currently gate outbound sync.
    pub async fn pending_duplicate_count(&self) -> EngineResult<usize> {
        Ok(self.adapter.get_potential_duplicates().await?.len())
    }

    pub async fn clear_store(&self) -> EngineResult<()> {
        Ok(self.adapter.clear_store().await?)
    }

    pub async fn close_connection(&self) -> EngineResult<()> {
        Ok(self.adapter.close_connection().await?)
    }
}
