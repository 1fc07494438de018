//! Postgres event-log adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, TenantId};
use fieldbook_domain::{AuditLogEntry, FormSubmission, SyncCursor};
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::adapter::{EventPage, EventStorageAdapter};
use crate::error::{StorageError, StorageResult};
use crate::subtree::collect_subtree;

use super::{
    format_timestamp, is_unique_violation, map_sqlx_error, parse_cursor, parse_timestamp,
};

/// Relational event-log backend scoped to one tenant over a shared pool.
#[derive(Debug, Clone)]
pub struct PgEventStorageAdapter {
    pool: PgPool,
    tenant: TenantId,
}

impl PgEventStorageAdapter {
    pub fn new(pool: PgPool, tenant: TenantId) -> Self {
        Self { pool, tenant }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn decode_event(&self, row: &sqlx::postgres::PgRow) -> StorageResult<FormSubmission> {
        let timestamp: DateTime<Utc> = row
            .try_get("timestamp")
            .map_err(|e| StorageError::serialization(format!("timestamp: {e}")))?;
        let sync_level: i32 = row
            .try_get("sync_level")
            .map_err(|e| StorageError::serialization(format!("sync_level: {e}")))?;
        let sync_level = SyncLevel::from_i32(sync_level)
            .ok_or_else(|| StorageError::serialization(format!("bad sync_level {sync_level}")))?;

        Ok(FormSubmission {
            guid: EventGuid::new(get_text(row, "guid")?),
            entity_guid: EntityGuid::new(get_text(row, "entity_guid")?),
            event_type: get_text(row, "type")?,
            data: row
                .try_get("data")
                .map_err(|e| StorageError::serialization(format!("data: {e}")))?,
            timestamp: format_timestamp(timestamp),
            user_id: get_text(row, "user_id")?.into(),
            sync_level,
        })
    }

    fn decode_audit(&self, row: &sqlx::postgres::PgRow) -> StorageResult<AuditLogEntry> {
        let timestamp: DateTime<Utc> = row
            .try_get("timestamp")
            .map_err(|e| StorageError::serialization(format!("timestamp: {e}")))?;
        let sync_level: i32 = row
            .try_get("sync_level")
            .map_err(|e| StorageError::serialization(format!("sync_level: {e}")))?;
        let sync_level = SyncLevel::from_i32(sync_level)
            .ok_or_else(|| StorageError::serialization(format!("bad sync_level {sync_level}")))?;

        Ok(AuditLogEntry {
            guid: EventGuid::new(get_text(row, "guid")?),
            entity_guid: EntityGuid::new(get_text(row, "entity_guid")?),
            event_guid: EventGuid::new(get_text(row, "event_guid")?),
            action: get_text(row, "action")?,
            changes: row
                .try_get("changes")
                .map_err(|e| StorageError::serialization(format!("changes: {e}")))?,
            user_id: get_text(row, "user_id")?.into(),
            timestamp: format_timestamp(timestamp),
            signature: get_text(row, "signature")?,
            sync_level,
        })
    }
}

fn get_text(row: &sqlx::postgres::PgRow, column: &str) -> StorageResult<String> {
    row.try_get::<String, _>(column)
        .map_err(|e| StorageError::serialization(format!("{column}: {e}")))
}

fn cursor_table(cursor: SyncCursor) -> &'static str {
    match cursor {
        SyncCursor::LastRemoteSync => "last_remote_sync_timestamp",
        SyncCursor::LastLocalSync => "last_local_sync_timestamp",
        SyncCursor::LastPushExternal => "last_push_external_sync_timestamp",
        SyncCursor::LastPullExternal => "last_pull_external_sync_timestamp",
    }
}

const SELECT_EVENT_COLUMNS: &str =
    "SELECT guid, entity_guid, type, data, timestamp, user_id, sync_level FROM events";

const SELECT_AUDIT_COLUMNS: &str = "SELECT guid, entity_guid, event_guid, action, changes, \
     signature, user_id, timestamp, sync_level FROM audit_log";

#[async_trait]
impl EventStorageAdapter for PgEventStorageAdapter {
    #[instrument(skip(self), fields(tenant_id = %self.tenant), err)]
    async fn initialize(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS events (
                guid TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                entity_guid TEXT NOT NULL,
                type TEXT NOT NULL,
                data JSONB NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                user_id TEXT NOT NULL,
                sync_level INT NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_events_tenant_id ON events (tenant_id)",
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id SERIAL PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                action TEXT NOT NULL,
                guid TEXT NOT NULL,
                entity_guid TEXT NOT NULL,
                event_guid TEXT NOT NULL,
                changes JSONB,
                signature TEXT,
                user_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                sync_level INT NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_audit_log_tenant_id ON audit_log (tenant_id)",
            r#"
            CREATE TABLE IF NOT EXISTS merkle_root (
                id SERIAL PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                root TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS last_remote_sync_timestamp (
                id SERIAL PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS last_local_sync_timestamp (
                id SERIAL PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS last_push_external_sync_timestamp (
                id SERIAL PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS last_pull_external_sync_timestamp (
                id SERIAL PRIMARY KEY,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("initialize", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, events), fields(tenant_id = %self.tenant, count = events.len()), err)]
    async fn save_events(&self, events: &[FormSubmission]) -> StorageResult<Vec<EventGuid>> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        for event in events {
            let timestamp = parse_timestamp(&event.timestamp)?;
            sqlx::query(
                r#"
                INSERT INTO events (guid, tenant_id, entity_guid, type, data, timestamp, user_id, sync_level)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.guid.as_str())
            .bind(self.tenant.as_str())
            .bind(event.entity_guid.as_str())
            .bind(&event.event_type)
            .bind(&event.data)
            .bind(timestamp)
            .bind(event.user_id.as_str())
            .bind(event.sync_level.as_i32())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::DuplicateEvent(event.guid.to_string())
                } else {
                    map_sqlx_error("save_events", e)
                }
            })?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(events.iter().map(|e| e.guid.clone()).collect())
    }

    async fn get_events(&self) -> StorageResult<Vec<FormSubmission>> {
        // The schema has no sequence column; (timestamp, guid) is the stable
        // log order.
        let rows = sqlx::query(&format!(
            "{SELECT_EVENT_COLUMNS} WHERE tenant_id = $1 ORDER BY timestamp ASC, guid ASC"
        ))
        .bind(self.tenant.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_events", e))?;

        rows.iter().map(|row| self.decode_event(row)).collect()
    }

    async fn get_events_since(&self, since: &str) -> StorageResult<Vec<FormSubmission>> {
        let cursor = parse_cursor(since)?;
        let rows = sqlx::query(&format!(
            "{SELECT_EVENT_COLUMNS} WHERE tenant_id = $1 \
             AND ($2::timestamptz IS NULL OR timestamp > $2) \
             ORDER BY timestamp ASC, guid ASC"
        ))
        .bind(self.tenant.as_str())
        .bind(cursor)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_events_since", e))?;

        rows.iter().map(|row| self.decode_event(row)).collect()
    }

    async fn get_events_since_paginated(
        &self,
        since: &str,
        limit: usize,
    ) -> StorageResult<EventPage> {
        let cursor = parse_cursor(since)?;
        // Fetch one extra row to learn whether events remain past this page.
        let rows = sqlx::query(&format!(
            "{SELECT_EVENT_COLUMNS} WHERE tenant_id = $1 \
             AND ($2::timestamptz IS NULL OR timestamp > $2) \
             ORDER BY timestamp ASC, guid ASC LIMIT $3"
        ))
        .bind(self.tenant.as_str())
        .bind(cursor)
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_events_since_paginated", e))?;

        let remainder = rows.len() > limit;
        let events: Vec<FormSubmission> = rows
            .iter()
            .take(limit)
            .map(|row| self.decode_event(row))
            .collect::<StorageResult<_>>()?;

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
        // The adjacency is built from the full log; descendants can appear
        // before their parent links, so no single WHERE clause covers this.
        let log = self.get_events().await?;
        Ok(collect_subtree(&log, root.as_str(), since_inclusive))
    }

    async fn is_event_existed(&self, guid: &EventGuid) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM events WHERE tenant_id = $1 AND guid = $2")
            .bind(self.tenant.as_str())
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_event_existed", e))?;
        Ok(row.is_some())
    }

    async fn update_event_sync_level(
        &self,
        guid: &EventGuid,
        level: SyncLevel,
    ) -> StorageResult<()> {
        // The level guard keeps re-synced batches idempotent: downgrades
        // simply match no row.
        sqlx::query(
            "UPDATE events SET sync_level = $3 \
             WHERE tenant_id = $1 AND guid = $2 AND sync_level <= $3",
        )
        .bind(self.tenant.as_str())
        .bind(guid.as_str())
        .bind(level.as_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_event_sync_level", e))?;
        Ok(())
    }

    async fn update_sync_level_from_events(
        &self,
        events: &[FormSubmission],
    ) -> StorageResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        for event in events {
            sqlx::query(
                "UPDATE events SET sync_level = $3 \
                 WHERE tenant_id = $1 AND guid = $2 AND sync_level <= $3",
            )
            .bind(self.tenant.as_str())
            .bind(event.guid.as_str())
            .bind(event.sync_level.as_i32())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_sync_level_from_events", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self, entries), fields(tenant_id = %self.tenant, count = entries.len()), err)]
    async fn save_audit_logs(&self, entries: &[AuditLogEntry]) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        for entry in entries {
            let timestamp = parse_timestamp(&entry.timestamp)?;
            sqlx::query(
                r#"
                INSERT INTO audit_log
                    (tenant_id, action, guid, entity_guid, event_guid, changes, signature, user_id, timestamp, sync_level)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(self.tenant.as_str())
            .bind(&entry.action)
            .bind(entry.guid.as_str())
            .bind(entry.entity_guid.as_str())
            .bind(entry.event_guid.as_str())
            .bind(&entry.changes)
            .bind(&entry.signature)
            .bind(entry.user_id.as_str())
            .bind(timestamp)
            .bind(entry.sync_level.as_i32())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_audit_logs", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn get_audit_logs_since(&self, since: &str) -> StorageResult<Vec<AuditLogEntry>> {
        let cursor = parse_cursor(since)?;
        let rows = sqlx::query(&format!(
            "{SELECT_AUDIT_COLUMNS} WHERE tenant_id = $1 \
             AND ($2::timestamptz IS NULL OR timestamp > $2) \
             ORDER BY timestamp ASC, id ASC"
        ))
        .bind(self.tenant.as_str())
        .bind(cursor)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_audit_logs_since", e))?;

        rows.iter().map(|row| self.decode_audit(row)).collect()
    }

    async fn get_audit_trail_by_entity_guid(
        &self,
        entity_guid: &EntityGuid,
    ) -> StorageResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(&format!(
            "{SELECT_AUDIT_COLUMNS} WHERE tenant_id = $1 AND entity_guid = $2 \
             ORDER BY timestamp DESC, id DESC"
        ))
        .bind(self.tenant.as_str())
        .bind(entity_guid.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_audit_trail_by_entity_guid", e))?;

        rows.iter().map(|row| self.decode_audit(row)).collect()
    }

    async fn update_audit_log_sync_level(
        &self,
        entity_guid: &EntityGuid,
        level: SyncLevel,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE audit_log SET sync_level = $3 \
             WHERE tenant_id = $1 AND entity_guid = $2 AND sync_level <= $3",
        )
        .bind(self.tenant.as_str())
        .bind(entity_guid.as_str())
        .bind(level.as_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_audit_log_sync_level", e))?;
        Ok(())
    }

    async fn save_merkle_root(&self, root: &str) -> StorageResult<()> {
        // Set semantics: delete the prior row, insert the new one.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        sqlx::query("DELETE FROM merkle_root WHERE tenant_id = $1")
            .bind(self.tenant.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_merkle_root", e))?;
        if !root.is_empty() {
            sqlx::query("INSERT INTO merkle_root (tenant_id, root) VALUES ($1, $2)")
                .bind(self.tenant.as_str())
                .bind(root)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("save_merkle_root", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn get_merkle_root(&self) -> StorageResult<String> {
        let row = sqlx::query(
            "SELECT root FROM merkle_root WHERE tenant_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(self.tenant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_merkle_root", e))?;

        match row {
            Some(row) => get_text(&row, "root"),
            None => Ok(String::new()),
        }
    }

    async fn get_sync_cursor(&self, cursor: SyncCursor) -> StorageResult<String> {
        let table = cursor_table(cursor);
        let row = sqlx::query(&format!(
            "SELECT timestamp FROM {table} WHERE tenant_id = $1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(self.tenant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_sync_cursor", e))?;

        match row {
            Some(row) => {
                let ts: DateTime<Utc> = row
                    .try_get("timestamp")
                    .map_err(|e| StorageError::serialization(format!("timestamp: {e}")))?;
                Ok(format_timestamp(ts))
            }
            None => Ok(String::new()),
        }
    }

    async fn set_sync_cursor(&self, cursor: SyncCursor, timestamp: &str) -> StorageResult<()> {
        let table = cursor_table(cursor);
        let parsed = parse_timestamp(timestamp)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = $1"))
            .bind(self.tenant.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_sync_cursor", e))?;
        sqlx::query(&format!(
            "INSERT INTO {table} (tenant_id, timestamp) VALUES ($1, $2)"
        ))
        .bind(self.tenant.as_str())
        .bind(parsed)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_sync_cursor", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %self.tenant), err)]
    async fn clear_store(&self) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        for table in [
            "events",
            "audit_log",
            "merkle_root",
            "last_remote_sync_timestamp",
            "last_local_sync_timestamp",
            "last_push_external_sync_timestamp",
            "last_pull_external_sync_timestamp",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = $1"))
                .bind(self.tenant.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("clear_store", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }
}
