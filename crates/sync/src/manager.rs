//! The sync state machine: push local events, then pull remote events,
//! paginated both ways, gated on unresolved duplicates.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fieldbook_core::SyncLevel;
use fieldbook_domain::{AuditLogEntry, FormSubmission, SyncCursor};
use fieldbook_engine::{EngineError, EntityDataManager, RemoteApply};
use fieldbook_store::AuthTokenStorageAdapter;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::transport::{AuthToken, Credentials, RemoteSyncTransport};

/// Key under which the access token is stored on the client.
const ACCESS_TOKEN: &str = "access";

/// Tuning knobs for one sync manager instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Events per pushed/pulled page.
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

/// Where a sync currently stands (or ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Pushing,
    Pulling,
    Complete,
    Failed,
}

/// What one completed `sync()` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Local events acknowledged by the server.
    pub pushed: usize,
    /// Remote events applied locally.
    pub pulled: usize,
    /// Remote events skipped because their guid was already in the log.
    pub skipped: usize,
    /// Remote events that failed to apply (logged, sync continued).
    pub failed: usize,
    pub last_local_sync: Option<String>,
    pub last_remote_sync: Option<String>,
}

/// Two-phase bidirectional sync against one remote.
///
/// A `sync()` runs to completion or failure; there is no mid-phase
/// cancellation. Partial progress is durable: pages the server acknowledged
/// stay `Synced`, pulled events stay applied.
pub struct InternalSyncManager {
    manager: Arc<EntityDataManager>,
    transport: Arc<dyn RemoteSyncTransport>,
    auth_store: Option<Arc<dyn AuthTokenStorageAdapter>>,
    config: SyncConfig,
    /// Re-entry latch: a second `sync()` while active returns
    /// `AlreadyRunning` without touching anything.
    is_syncing: AtomicBool,
    phase: Mutex<SyncPhase>,
}

impl InternalSyncManager {
    pub fn new(
        manager: Arc<EntityDataManager>,
        transport: Arc<dyn RemoteSyncTransport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            manager,
            transport,
            auth_store: None,
            config,
            is_syncing: AtomicBool::new(false),
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    /// Persist issued tokens through this adapter.
    pub fn with_auth_store(mut self, store: Arc<dyn AuthTokenStorageAdapter>) -> Self {
        self.auth_store = Some(store);
        self
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    /// Obtain and store an access token.
    pub async fn authenticate(&self, credentials: &Credentials) -> SyncResult<AuthToken> {
        let token = self.transport.authenticate(credentials).await?;
        self.store_token(&token).await?;
        Ok(token)
    }

    /// Refresh the stored access token.
    pub async fn refresh_token(&self) -> SyncResult<AuthToken> {
        let current = match &self.auth_store {
            Some(store) => store
                .get_token(ACCESS_TOKEN)
                .await
                .map_err(EngineError::from)?
                .map(AuthToken::new),
            None => None,
        };
        let current = current.ok_or(crate::error::TransportError::Unauthorized)?;
        let token = self.transport.refresh_token(&current).await?;
        self.store_token(&token).await?;
        Ok(token)
    }

    async fn store_token(&self, token: &AuthToken) -> SyncResult<()> {
        if let Some(store) = &self.auth_store {
            store
                .save_token(ACCESS_TOKEN, token.as_str())
                .await
                .map_err(EngineError::from)?;
        }
        Ok(())
    }

    /// Record that an external-system push/pull reached `timestamp`.
    pub async fn record_external_push(&self, timestamp: &str) -> SyncResult<()> {
        self.manager
            .event_store()
            .set_sync_cursor(SyncCursor::LastPushExternal, timestamp)
            .await?;
        Ok(())
    }

    pub async fn record_external_pull(&self, timestamp: &str) -> SyncResult<()> {
        self.manager
            .event_store()
            .set_sync_cursor(SyncCursor::LastPullExternal, timestamp)
            .await?;
        Ok(())
    }

    /// Run one full push-then-pull exchange.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        if self.is_syncing.swap(true, Ordering::AcqRel) {
            return Err(SyncError::AlreadyRunning);
        }

        let result = self.run_sync().await;
        match &result {
            Ok(_) | Err(SyncError::DuplicatesBlockSync { .. }) => {}
            Err(_) => self.set_phase(SyncPhase::Failed),
        }
        self.is_syncing.store(false, Ordering::Release);
        result
    }

    async fn run_sync(&self) -> SyncResult<SyncReport> {
        let events = self.manager.event_store();
        let entities = self.manager.entity_store();

        let pending = entities.pending_duplicate_count().await?;
        if pending > 0 {
            self.set_phase(SyncPhase::Idle);
            return Err(SyncError::DuplicatesBlockSync { pending });
        }

        let mut report = SyncReport::default();

        // ── push ─────────────────────────────────────────────────
        self.set_phase(SyncPhase::Pushing);

        let mut local: Vec<FormSubmission> = events
            .get_events()
            .await?
            .into_iter()
            .filter(|e| e.sync_level == SyncLevel::Local)
            .collect();
        local.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        for page in local.chunks(self.config.page_size) {
            // A transport failure aborts here: nothing beyond acknowledged
            // pages ever advances.
            self.transport.push_events(page).await?;

            let acknowledged: Vec<FormSubmission> = page
                .iter()
                .map(|e| e.clone().with_sync_level(SyncLevel::Synced))
                .collect();
            events.update_sync_level_from_events(&acknowledged).await?;
            report.pushed += page.len();
        }

        if let Some(last) = local.last() {
            events
                .set_sync_cursor(SyncCursor::LastLocalSync, &last.timestamp)
                .await?;
            report.last_local_sync = Some(last.timestamp.clone());
        }

        self.push_audit_logs().await?;

        // ── pull ─────────────────────────────────────────────────
        self.set_phase(SyncPhase::Pulling);

        let pull_start = events.sync_cursor(SyncCursor::LastRemoteSync).await?;
        let mut cursor = pull_start.clone();
        let mut max_seen: Option<String> = None;

        loop {
            let page = self
                .transport
                .pull_events(&cursor, self.config.page_size)
                .await?;

            for event in page.events {
                let timestamp = event.timestamp.clone();
                let guid = event.guid.clone();
                match self.manager.apply_remote_event(event).await {
                    Ok(RemoteApply::Applied(_)) => report.pulled += 1,
                    Ok(RemoteApply::Skipped) => report.skipped += 1,
                    Err(err) => {
                        warn!(%guid, %err, "failed to apply pulled event");
                        report.failed += 1;
                    }
                }
                if max_seen.as_deref().is_none_or(|seen| timestamp.as_str() > seen) {
                    max_seen = Some(timestamp);
                }
            }

            match page.next_cursor {
                Some(next) => cursor = next,
                None => break,
            }
        }

        if let Some(max) = max_seen {
            events
                .set_sync_cursor(SyncCursor::LastRemoteSync, &max)
                .await?;
            report.last_remote_sync = Some(max);
        }

        self.pull_audit_logs(&pull_start).await?;

        self.set_phase(SyncPhase::Complete);
        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            skipped = report.skipped,
            failed = report.failed,
            "sync complete"
        );
        Ok(report)
    }

    /// Mirror local audit entries to the server after the event push.
    async fn push_audit_logs(&self) -> SyncResult<()> {
        let events = self.manager.event_store();
        let local: Vec<AuditLogEntry> = events
            .get_audit_logs_since("")
            .await?
            .into_iter()
            .filter(|a| a.sync_level == SyncLevel::Local)
            .collect();
        if local.is_empty() {
            return Ok(());
        }

        self.transport.push_audit_logs(&local).await?;

        let entity_guids: HashSet<_> = local.iter().map(|a| a.entity_guid.clone()).collect();
        for entity_guid in entity_guids {
            events
                .update_audit_log_sync_level(&entity_guid, SyncLevel::Synced)
                .await?;
        }
        Ok(())
    }

    /// Ingest remote audit entries idempotently by guid.
    async fn pull_audit_logs(&self, since: &str) -> SyncResult<()> {
        let events = self.manager.event_store();
        let remote = self.transport.pull_audit_logs(since).await?;
        if remote.is_empty() {
            return Ok(());
        }

        let known: HashSet<String> = events
            .get_audit_logs_since("")
            .await?
            .into_iter()
            .map(|a| a.guid.to_string())
            .collect();

        let fresh: Vec<AuditLogEntry> = remote
            .into_iter()
            .filter(|a| !known.contains(a.guid.as_str()))
            .map(|mut a| {
                if a.sync_level.can_advance_to(SyncLevel::Remote) {
                    a.sync_level = SyncLevel::Remote;
                }
                a
            })
            .collect();
        if !fresh.is_empty() {
            events.save_audit_logs(&fresh).await?;
        }
        Ok(())
    }
}
