//! End-to-end sync tests over the embedded backend and the mock transport.

use std::sync::Arc;

use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, TenantId, UserId};
use fieldbook_domain::{DuplicateCandidate, FormSubmission, SyncCursor};
use fieldbook_engine::{EntityDataManager, EntityStore, EventStore};
use fieldbook_store::{
    AuthTokenStorageAdapter, MemoryAuthTokenAdapter, MemoryEntityStorageAdapter,
    MemoryEventStorageAdapter,
};
use fieldbook_sync::transport::mock::MockTransport;
use fieldbook_sync::{
    AuthToken, Credentials, InternalSyncManager, PullPage, PushAck, RemoteSyncTransport,
    SyncConfig, SyncError, SyncPhase, TransportError,
};
use serde_json::json;

struct Fixture {
    events: Arc<EventStore>,
    entities: Arc<EntityStore>,
    manager: Arc<EntityDataManager>,
    transport: Arc<MockTransport>,
    sync: InternalSyncManager,
}

async fn fixture() -> Fixture {
    fixture_with_config(SyncConfig::default()).await
}

async fn fixture_with_config(config: SyncConfig) -> Fixture {
    let events = Arc::new(EventStore::new(Arc::new(MemoryEventStorageAdapter::new(
        TenantId::default(),
    ))));
    let entities = Arc::new(EntityStore::new(Arc::new(
        MemoryEntityStorageAdapter::new(TenantId::default()),
    )));
    events.initialize().await.unwrap();
    entities.initialize().await.unwrap();

    let manager = Arc::new(EntityDataManager::new(events.clone(), entities.clone()));
    let transport = Arc::new(MockTransport::new());
    let sync = InternalSyncManager::new(manager.clone(), transport.clone(), config);

    Fixture {
        events,
        entities,
        manager,
        transport,
        sync,
    }
}

fn form(guid: &str, entity: &str, kind: &str, name: &str, ts: &str) -> FormSubmission {
    FormSubmission {
        guid: EventGuid::new(guid),
        entity_guid: EntityGuid::new(entity),
        event_type: kind.to_string(),
        data: json!({"name": name}),
        timestamp: ts.to_string(),
        user_id: UserId::new("u1"),
        sync_level: SyncLevel::Local,
    }
}

#[tokio::test]
async fn duplicate_gate_blocks_sync_until_resolved() {
    let fx = fixture().await;
    fx.entities
        .save_potential_duplicates(&[DuplicateCandidate::new("a", "b")])
        .await
        .unwrap();

    let err = fx.sync.sync().await.unwrap_err();
    assert_eq!(err, SyncError::DuplicatesBlockSync { pending: 1 });
    assert!(!fx.sync.is_syncing());
    assert_eq!(fx.sync.phase(), SyncPhase::Idle);

    fx.entities
        .resolve_potential_duplicates(&[DuplicateCandidate::new("a", "b")])
        .await
        .unwrap();
    let report = fx.sync.sync().await.unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(fx.sync.phase(), SyncPhase::Complete);
}

#[tokio::test]
async fn push_pages_events_and_advances_sync_levels() {
    let fx = fixture_with_config(SyncConfig { page_size: 2 }).await;
    for i in 0..5 {
        fx.manager
            .submit_event(form(
                &format!("e{i}"),
                &format!("p{i}"),
                "create-individual",
                "Ana",
                &format!("2024-01-0{}T00:00:00Z", i + 1),
            ))
            .await
            .unwrap();
    }

    let report = fx.sync.sync().await.unwrap();
    assert_eq!(report.pushed, 5);
    assert_eq!(fx.transport.pushed_pages(), vec![2, 2, 1]);
    assert_eq!(
        report.last_local_sync.as_deref(),
        Some("2024-01-05T00:00:00Z")
    );
    assert_eq!(
        fx.events.sync_cursor(SyncCursor::LastLocalSync).await.unwrap(),
        "2024-01-05T00:00:00Z"
    );

    // Every local event advanced to Synced; nothing regressed.
    for event in fx.events.get_events().await.unwrap() {
        assert_eq!(event.sync_level, SyncLevel::Synced);
    }
    assert_eq!(fx.transport.server_events().len(), 5);
}

#[tokio::test]
async fn pull_is_idempotent_across_syncs() {
    let fx = fixture().await;
    fx.transport.seed_events(vec![
        form("r1", "p1", "create-individual", "Ana", "2024-02-01T00:00:00Z"),
        form("r2", "p1", "update-individual", "Anna", "2024-02-02T00:00:00Z"),
    ]);

    let first = fx.sync.sync().await.unwrap();
    assert_eq!(first.pulled, 2);
    assert_eq!(first.skipped, 0);
    assert_eq!(
        first.last_remote_sync.as_deref(),
        Some("2024-02-02T00:00:00Z")
    );

    let pair = fx.entities.get_entity("p1").await.unwrap().unwrap();
    assert_eq!(pair.modified.version, 2);
    assert_eq!(pair.modified.data["name"], "Anna");

    // The server returns the same events again: everything is skipped by
    // guid, and nothing changes locally.
    fx.events
        .set_sync_cursor(SyncCursor::LastRemoteSync, "")
        .await
        .unwrap();
    let second = fx.sync.sync().await.unwrap();
    assert_eq!(second.pulled, 0);
    assert_eq!(second.skipped, 2);

    assert_eq!(fx.events.get_events().await.unwrap().len(), 2);
    let pair = fx.entities.get_entity("p1").await.unwrap().unwrap();
    assert_eq!(pair.modified.version, 2);
    let trail = fx
        .events
        .get_audit_trail_by_entity_guid(&EntityGuid::new("p1"))
        .await
        .unwrap();
    assert_eq!(trail.len(), 2);
}

#[tokio::test]
async fn pull_paginates_until_cursor_runs_dry() {
    let fx = fixture_with_config(SyncConfig { page_size: 1 }).await;
    fx.transport.seed_events(vec![
        form("r1", "a", "create-individual", "A", "2024-02-01T00:00:00Z"),
        form("r2", "b", "create-individual", "B", "2024-02-02T00:00:00Z"),
        form("r3", "c", "create-individual", "C", "2024-02-03T00:00:00Z"),
    ]);

    let report = fx.sync.sync().await.unwrap();
    assert_eq!(report.pulled, 3);
    assert_eq!(
        fx.events.sync_cursor(SyncCursor::LastRemoteSync).await.unwrap(),
        "2024-02-03T00:00:00Z"
    );

    // The advanced cursor keeps the next sync incremental.
    fx.transport.seed_events(vec![form(
        "r4",
        "d",
        "create-individual",
        "D",
        "2024-02-04T00:00:00Z",
    )]);
    let next = fx.sync.sync().await.unwrap();
    assert_eq!(next.pulled, 1);
    assert_eq!(next.skipped, 0);
}

#[tokio::test]
async fn push_failure_aborts_without_advancing_unacknowledged_pages() {
    let fx = fixture_with_config(SyncConfig { page_size: 1 }).await;
    for i in 0..3 {
        fx.manager
            .submit_event(form(
                &format!("e{i}"),
                &format!("p{i}"),
                "create-individual",
                "Ana",
                &format!("2024-01-0{}T00:00:00Z", i + 1),
            ))
            .await
            .unwrap();
    }
    fx.transport.fail_push_on_page(1);

    let err = fx.sync.sync().await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Transport(TransportError::Transient("connection reset".into()))
    );
    assert_eq!(fx.sync.phase(), SyncPhase::Failed);
    assert!(!fx.sync.is_syncing());

    // The acknowledged first page stays Synced (durable partial progress);
    // the rest never advanced.
    let levels: Vec<SyncLevel> = fx
        .events
        .get_events()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.sync_level)
        .collect();
    assert_eq!(
        levels,
        vec![SyncLevel::Synced, SyncLevel::Local, SyncLevel::Local]
    );
    // The push cursor did not move.
    assert_eq!(
        fx.events.sync_cursor(SyncCursor::LastLocalSync).await.unwrap(),
        ""
    );

    // A retry completes the push.
    let report = fx.sync.sync().await.unwrap();
    assert_eq!(report.pushed, 2);
    assert_eq!(fx.sync.phase(), SyncPhase::Complete);
}

#[tokio::test]
async fn push_then_pull_of_the_same_event_is_a_noop() {
    let fx = fixture().await;
    fx.manager
        .submit_event(form(
            "e1",
            "p1",
            "create-individual",
            "Ana",
            "2024-01-01T00:00:00Z",
        ))
        .await
        .unwrap();

    // One sync pushes the event; the mock server immediately offers it back
    // in the pull phase, where the guid check skips it.
    let report = fx.sync.sync().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 0);
    assert_eq!(report.skipped, 1);

    let pair = fx.entities.get_entity("p1").await.unwrap().unwrap();
    assert_eq!(pair.modified.version, 1);
    assert_eq!(fx.events.get_events().await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_entries_mirror_both_ways() {
    let fx = fixture().await;
    fx.manager
        .submit_event(form(
            "e1",
            "p1",
            "create-individual",
            "Ana",
            "2024-01-01T00:00:00Z",
        ))
        .await
        .unwrap();

    let remote_event = form("r1", "q1", "create-individual", "Bo", "2024-02-01T00:00:00Z");
    let remote_audit =
        fieldbook_domain::AuditLogEntry::for_application(&remote_event, "remote-sig");
    fx.transport.seed_events(vec![remote_event]);
    fx.transport.seed_audit_logs(vec![remote_audit.clone()]);

    fx.sync.sync().await.unwrap();

    // Local entry reached the server.
    assert_eq!(fx.transport.server_audit_logs().len(), 2);

    // The remote entry landed locally exactly once, at level Remote.
    let local = fx.events.get_audit_logs_since("").await.unwrap();
    let pulled: Vec<_> = local.iter().filter(|a| a.guid == remote_audit.guid).collect();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].sync_level, SyncLevel::Remote);

    // Re-syncing does not duplicate it.
    fx.events
        .set_sync_cursor(SyncCursor::LastRemoteSync, "")
        .await
        .unwrap();
    fx.sync.sync().await.unwrap();
    let local = fx.events.get_audit_logs_since("").await.unwrap();
    assert_eq!(
        local.iter().filter(|a| a.guid == remote_audit.guid).count(),
        1
    );
}

#[tokio::test]
async fn authenticate_stores_the_issued_token() {
    let events = Arc::new(EventStore::new(Arc::new(MemoryEventStorageAdapter::new(
        TenantId::default(),
    ))));
    let entities = Arc::new(EntityStore::new(Arc::new(
        MemoryEntityStorageAdapter::new(TenantId::default()),
    )));
    events.initialize().await.unwrap();
    entities.initialize().await.unwrap();

    let auth: Arc<MemoryAuthTokenAdapter> = Arc::new(MemoryAuthTokenAdapter::new());
    auth.initialize().await.unwrap();

    let manager = Arc::new(EntityDataManager::new(events, entities));
    let sync = InternalSyncManager::new(
        manager,
        Arc::new(MockTransport::new()),
        SyncConfig::default(),
    )
    .with_auth_store(auth.clone());

    let token = sync
        .authenticate(&Credentials {
            username: "officer".into(),
            password: "secret".into(),
        })
        .await
        .unwrap();
    assert_eq!(
        auth.get_token("access").await.unwrap().as_deref(),
        Some(token.as_str())
    );

    let refreshed = sync.refresh_token().await.unwrap();
    assert_ne!(refreshed, token);
    assert_eq!(
        auth.get_token("access").await.unwrap().as_deref(),
        Some(refreshed.as_str())
    );
}

#[tokio::test]
async fn external_cursors_track_independently() {
    let fx = fixture().await;
    fx.sync
        .record_external_push("2024-03-01T00:00:00Z")
        .await
        .unwrap();
    fx.sync
        .record_external_pull("2024-03-02T00:00:00Z")
        .await
        .unwrap();

    assert_eq!(
        fx.events
            .sync_cursor(SyncCursor::LastPushExternal)
            .await
            .unwrap(),
        "2024-03-01T00:00:00Z"
    );
    assert_eq!(
        fx.events
            .sync_cursor(SyncCursor::LastPullExternal)
            .await
            .unwrap(),
        "2024-03-02T00:00:00Z"
    );
    assert_eq!(
        fx.events.sync_cursor(SyncCursor::LastRemoteSync).await.unwrap(),
        ""
    );
}

/// A transport that parks inside the pull phase until released, to observe
/// the re-entry latch from outside.
struct StallingTransport {
    entered: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

impl StallingTransport {
    fn new() -> Self {
        Self {
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        }
    }
}

#[async_trait::async_trait]
impl RemoteSyncTransport for StallingTransport {
    async fn authenticate(&self, _c: &Credentials) -> Result<AuthToken, TransportError> {
        Ok(AuthToken::new("t"))
    }

    async fn refresh_token(&self, token: &AuthToken) -> Result<AuthToken, TransportError> {
        Ok(token.clone())
    }

    async fn push_events(&self, page: &[FormSubmission]) -> Result<PushAck, TransportError> {
        Ok(PushAck {
            accepted: page.len(),
        })
    }

    async fn pull_events(&self, _since: &str, _limit: usize) -> Result<PullPage, TransportError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(PullPage {
            events: vec![],
            next_cursor: None,
        })
    }

    async fn push_audit_logs(&self, _entries: &[fieldbook_domain::AuditLogEntry]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn pull_audit_logs(
        &self,
        _since: &str,
    ) -> Result<Vec<fieldbook_domain::AuditLogEntry>, TransportError> {
        Ok(vec![])
    }
}

#[tokio::test]
async fn second_sync_while_active_returns_already_running() {
    let events = Arc::new(EventStore::new(Arc::new(MemoryEventStorageAdapter::new(
        TenantId::default(),
    ))));
    let entities = Arc::new(EntityStore::new(Arc::new(
        MemoryEntityStorageAdapter::new(TenantId::default()),
    )));
    events.initialize().await.unwrap();
    entities.initialize().await.unwrap();

    let manager = Arc::new(EntityDataManager::new(events, entities));
    let transport = Arc::new(StallingTransport::new());
    let sync = Arc::new(InternalSyncManager::new(
        manager,
        transport.clone(),
        SyncConfig::default(),
    ));

    let running = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.sync().await })
    };

    // Wait until the first sync is parked inside its pull phase.
    transport.entered.notified().await;
    assert!(sync.is_syncing());
    assert_eq!(sync.sync().await.unwrap_err(), SyncError::AlreadyRunning);

    transport.release.notify_one();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.pulled, 0);
    assert!(!sync.is_syncing());
    assert_eq!(sync.phase(), SyncPhase::Complete);
}
