//! Postgres entity adapter.

use async_trait::async_trait;
use chrono::{NaiveDateTime, SecondsFormat, Utc};
use fieldbook_core::{EntityGuid, TenantId};
use fieldbook_domain::{DuplicateCandidate, EntityDoc, EntityPair};
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::adapter::EntityStorageAdapter;
use crate::error::{StorageError, StorageResult};
use crate::search::SearchCriteria;

use super::{map_sqlx_error, parse_cursor, parse_timestamp};

/// Relational entity backend scoped to one tenant over a shared pool.
#[derive(Debug, Clone)]
pub struct PgEntityStorageAdapter {
    pool: PgPool,
    tenant: TenantId,
}

impl PgEntityStorageAdapter {
    pub fn new(pool: PgPool, tenant: TenantId) -> Self {
        Self { pool, tenant }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn decode_pair(&self, row: &sqlx::postgres::PgRow) -> StorageResult<EntityPair> {
        let guid: String = row
            .try_get("guid")
            .map_err(|e| StorageError::serialization(format!("guid: {e}")))?;
        let initial: serde_json::Value = row
            .try_get("initial")
            .map_err(|e| StorageError::serialization(format!("initial: {e}")))?;
        let modified: serde_json::Value = row
            .try_get("modified")
            .map_err(|e| StorageError::serialization(format!("modified: {e}")))?;

        let initial: EntityDoc = serde_json::from_value(initial)?;
        let modified: EntityDoc = serde_json::from_value(modified)?;
        Ok(EntityPair {
            guid: EntityGuid::new(guid),
            initial,
            modified,
        })
    }
}

const SELECT_PAIR_COLUMNS: &str = "SELECT guid, initial, modified FROM entities";

#[async_trait]
impl EntityStorageAdapter for PgEntityStorageAdapter {
    #[instrument(skip(self), fields(tenant_id = %self.tenant), err)]
    async fn initialize(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT NOT NULL,
                guid TEXT NOT NULL,
                initial JSONB NOT NULL,
                modified JSONB NOT NULL,
                sync_level TEXT,
                last_updated TIMESTAMP NOT NULL,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                PRIMARY KEY (id, tenant_id),
                UNIQUE (guid, tenant_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS potential_duplicates (
                entity_guid TEXT NOT NULL,
                duplicate_guid TEXT NOT NULL,
                tenant_id TEXT NOT NULL DEFAULT 'default',
                PRIMARY KEY (entity_guid, duplicate_guid, tenant_id)
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

    #[instrument(skip(self, pair), fields(tenant_id = %self.tenant, guid = %pair.guid), err)]
    async fn save_entity(&self, pair: &EntityPair) -> StorageResult<()> {
        let last_updated: NaiveDateTime =
            parse_timestamp(&pair.modified.last_updated)?.naive_utc();
        sqlx::query(
            r#"
            INSERT INTO entities (id, guid, initial, modified, sync_level, last_updated, tenant_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (guid, tenant_id) DO UPDATE SET
                initial = EXCLUDED.initial,
                modified = EXCLUDED.modified,
                sync_level = EXCLUDED.sync_level,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(pair.modified.id.as_str())
        .bind(pair.guid.as_str())
        .bind(serde_json::to_value(&pair.initial)?)
        .bind(serde_json::to_value(&pair.modified)?)
        .bind(pair.modified.sync_level.as_str())
        .bind(last_updated)
        .bind(self.tenant.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_entity", e))?;
        Ok(())
    }

    async fn get_entity(&self, id_or_guid: &str) -> StorageResult<Option<EntityPair>> {
        let row = sqlx::query(&format!(
            "{SELECT_PAIR_COLUMNS} WHERE tenant_id = $1 AND (id = $2 OR guid = $2)"
        ))
        .bind(self.tenant.as_str())
        .bind(id_or_guid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entity", e))?;

        row.map(|row| self.decode_pair(&row)).transpose()
    }

    async fn get_entity_by_external_id(
        &self,
        external_id: &str,
    ) -> StorageResult<Option<EntityPair>> {
        let row = sqlx::query(&format!(
            "{SELECT_PAIR_COLUMNS} WHERE tenant_id = $1 AND modified->>'externalId' = $2"
        ))
        .bind(self.tenant.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entity_by_external_id", e))?;

        row.map(|row| self.decode_pair(&row)).transpose()
    }

    async fn get_all_entities(&self) -> StorageResult<Vec<EntityPair>> {
        let rows = sqlx::query(&format!("{SELECT_PAIR_COLUMNS} WHERE tenant_id = $1"))
            .bind(self.tenant.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_all_entities", e))?;

        rows.iter().map(|row| self.decode_pair(row)).collect()
    }

    async fn get_modified_entities_since(&self, since: &str) -> StorageResult<Vec<EntityPair>> {
        let cursor = parse_cursor(since)?.map(|dt| dt.naive_utc());
        let rows = sqlx::query(&format!(
            "{SELECT_PAIR_COLUMNS} WHERE tenant_id = $1 \
             AND ($2::timestamp IS NULL OR last_updated > $2)"
        ))
        .bind(self.tenant.as_str())
        .bind(cursor)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_modified_entities_since", e))?;

        rows.iter().map(|row| self.decode_pair(row)).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %self.tenant), err)]
    async fn delete_entity(&self, id: &str) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query(
            "SELECT guid FROM entities WHERE tenant_id = $1 AND (id = $2 OR guid = $2)",
        )
        .bind(self.tenant.as_str())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_entity", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(());
        };
        let guid: String = row
            .try_get("guid")
            .map_err(|e| StorageError::serialization(format!("guid: {e}")))?;

        sqlx::query("DELETE FROM entities WHERE tenant_id = $1 AND guid = $2")
            .bind(self.tenant.as_str())
            .bind(&guid)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_entity", e))?;

        // Dangling duplicate-candidate rows go with the entity.
        sqlx::query(
            "DELETE FROM potential_duplicates WHERE tenant_id = $1 \
             AND (entity_guid = $2 OR duplicate_guid = $2)",
        )
        .bind(self.tenant.as_str())
        .bind(&guid)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_entity", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn mark_entity_as_synced(&self, id: &str) -> StorageResult<Option<EntityPair>> {
        let Some(mut pair) = self.get_entity(id).await? else {
            return Ok(None);
        };

        pair.modified.last_updated = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        pair.initial = pair.modified.clone();
        self.save_entity(&pair).await?;
        Ok(Some(pair))
    }

    async fn search_entities(&self, criteria: &SearchCriteria) -> StorageResult<Vec<EntityPair>> {
        // The candidate set is tenant-scoped in SQL; the compiled criteria
        // evaluate in-process so both backends share one matching semantics.
        let pairs = self.get_all_entities().await?;
        Ok(pairs
            .into_iter()
            .filter(|pair| criteria.matches(pair))
            .collect())
    }

    async fn save_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> StorageResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        for pair in pairs {
            // Store under the normalized key so (a, b) and (b, a) collide.
            let (first, second) = pair.key();
            sqlx::query(
                "INSERT INTO potential_duplicates (entity_guid, duplicate_guid, tenant_id) \
                 VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(&first)
            .bind(&second)
            .bind(self.tenant.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_potential_duplicates", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn get_potential_duplicates(&self) -> StorageResult<Vec<DuplicateCandidate>> {
        let rows = sqlx::query(
            "SELECT entity_guid, duplicate_guid FROM potential_duplicates WHERE tenant_id = $1",
        )
        .bind(self.tenant.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_potential_duplicates", e))?;

        rows.iter()
            .map(|row| {
                let entity: String = row
                    .try_get("entity_guid")
                    .map_err(|e| StorageError::serialization(format!("entity_guid: {e}")))?;
                let duplicate: String = row
                    .try_get("duplicate_guid")
                    .map_err(|e| StorageError::serialization(format!("duplicate_guid: {e}")))?;
                Ok(DuplicateCandidate::new(entity, duplicate))
            })
            .collect()
    }

    async fn resolve_potential_duplicates(
        &self,
        pairs: &[DuplicateCandidate],
    ) -> StorageResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        for pair in pairs {
            sqlx::query(
                "DELETE FROM potential_duplicates WHERE tenant_id = $1 AND \
                 ((entity_guid = $2 AND duplicate_guid = $3) OR \
                  (entity_guid = $3 AND duplicate_guid = $2))",
            )
            .bind(self.tenant.as_str())
            .bind(pair.entity_guid.as_str())
            .bind(pair.duplicate_guid.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("resolve_potential_duplicates", e))?;
        }
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
        for table in ["entities", "potential_duplicates"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = $1"))
                .bind(self.tenant.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("clear_store", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn close_connection(&self) -> StorageResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
