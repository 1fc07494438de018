//! The write façade: validate → apply → persist event(s) → persist entity →
//! audit. External callers and the sync pull path both come through here.

use std::sync::Arc;

use fieldbook_core::SyncLevel;
use fieldbook_domain::{AuditLogEntry, EventKind, FormSubmission, Transition, applier};
use fieldbook_merkle::leaf_hash;
use tracing::debug;

use crate::entity_store::EntityStore;
use crate::error::{EngineError, EngineResult};
use crate::event_store::EventStore;

/// Outcome of feeding one pulled event through the façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteApply {
    /// Applied; the entity now sits at this version.
    Applied(u64),
    /// Already in the log; skipped idempotently.
    Skipped,
}

/// Orchestrates a single write across the applier and both stores.
///
/// There is no cross-adapter transaction here by design: the event log is
/// the source of truth, and an entity persist that fails after the event
/// append leaves a log from which replay restores the entity.
pub struct EntityDataManager {
    events: Arc<EventStore>,
    entities: Arc<EntityStore>,
}

impl EntityDataManager {
    pub fn new(events: Arc<EventStore>, entities: Arc<EntityStore>) -> Self {
        Self { events, entities }
    }

    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.events
    }

    pub fn entity_store(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    /// Submit one form. Returns the entity's new version.
    pub async fn submit_event(&self, form: FormSubmission) -> EngineResult<u64> {
        self.validate(&form)?;
        let mut audit = Vec::new();
        let version = self.apply_and_persist(&form, &mut audit).await?;
        self.events.save_audit_logs(&audit).await?;
        Ok(version)
    }

    /// Submit a batch, reporting per-event outcomes.
    pub async fn submit_events(
        &self,
        forms: Vec<FormSubmission>,
    ) -> Vec<(fieldbook_core::EventGuid, EngineResult<u64>)> {
        let mut results = Vec::with_capacity(forms.len());
        for form in forms {
            let guid = form.guid.clone();
            let result = self.submit_event(form).await;
            results.push((guid, result));
        }
        results
    }

    /// Feed one pulled event through the write path, idempotently by guid.
    /// The event lands at `SyncLevel::Remote` (or keeps a higher level).
    pub async fn apply_remote_event(&self, form: FormSubmission) -> EngineResult<RemoteApply> {
        if self.events.is_event_existed(&form.guid).await? {
            debug!(guid = %form.guid, "pulled event already in log; skipping");
            return Ok(RemoteApply::Skipped);
        }

        let level = if form.sync_level.can_advance_to(SyncLevel::Remote) {
            SyncLevel::Remote
        } else {
            form.sync_level
        };
        let form = form.with_sync_level(level);

        self.validate(&form)?;
        let mut audit = Vec::new();
        let version = self.apply_and_persist(&form, &mut audit).await?;
        self.events.save_audit_logs(&audit).await?;
        Ok(RemoteApply::Applied(version))
    }

    fn validate(&self, form: &FormSubmission) -> EngineResult<()> {
        if form.guid.is_empty() {
            return Err(EngineError::Validation("event guid must not be empty".into()));
        }
        if form.entity_guid.is_empty() {
            return Err(EngineError::Validation(
                "entity guid must not be empty".into(),
            ));
        }
        form.parsed_timestamp()?;
        EventKind::parse(&form.event_type)
            .ok_or_else(|| EngineError::UnknownEventType(form.event_type.clone()))?;
        Ok(())
    }

    /// Apply one event and persist its effects; derived events recurse one
    /// level (a derived creation spawns nothing further). Audit entries
    /// accumulate into `audit`, one per applied event.
    async fn apply_and_persist(
        &self,
        form: &FormSubmission,
        audit: &mut Vec<AuditLogEntry>,
    ) -> EngineResult<u64> {
        let pair = self.entities.get_entity(form.entity_guid.as_str()).await?;
        let current = pair.as_ref().map(|p| &p.modified);
        let transition = applier::apply(current, form)?;

        self.events.save_event(form).await?;
        audit.push(AuditLogEntry::for_application(form, leaf_hash(form)));

        match transition {
            Transition::Upsert { entity, derived } => {
                let version = entity.version;
                let initial = pair.map(|p| p.initial);
                self.entities.save_entity(initial, entity).await?;

                for derived_event in derived {
                    Box::pin(self.apply_and_persist(&derived_event, audit)).await?;
                }
                Ok(version)
            }
            Transition::Delete { guid } => {
                let version = current.map(|doc| doc.version + 1).unwrap_or(1);
                self.entities.delete_entity(guid.as_str()).await?;
                Ok(version)
            }
        }
    }
}
