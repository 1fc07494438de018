//! Relational (Postgres) backend for the multi-tenant server.
//!
//! Every query carries `tenant_id` in its WHERE clause; batch writes run in
//! explicit transactions and roll back on any statement failure.
//!
//! ## Error mapping
//!
//! SQLx errors map onto `StorageError` as follows: unique violations
//! (`23505`) become `DuplicateEvent`/`Conflict`, row-decoding failures become
//! `Serialization`, everything else becomes `Backend`.

mod entity;
mod event;

pub use entity::PgEntityStorageAdapter;
pub use event::PgEventStorageAdapter;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{StorageError, StorageResult};

/// Open a connection pool shared by the adapters of all tenants.
pub async fn connect_pool(database_url: &str) -> StorageResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| StorageError::backend(format!("failed to connect pool: {e}")))
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                StorageError::Conflict(msg)
            } else {
                StorageError::Backend(msg)
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StorageError::Serialization(format!("row decode failed in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StorageError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StorageError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

/// Parse an originator ISO-8601 timestamp for binding to `TIMESTAMPTZ`.
pub(crate) fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::serialization(format!("bad timestamp '{value}': {e}")))
}

/// Optional variant: the empty string is the "from the beginning" sentinel.
pub(crate) fn parse_cursor(value: &str) -> StorageResult<Option<DateTime<Utc>>> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_timestamp(value).map(Some)
    }
}

/// Normalized rendering used on every read path, so timestamps coming back
/// out of `TIMESTAMPTZ` columns are stable.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
