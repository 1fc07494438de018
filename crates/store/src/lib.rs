//! Storage adapters: the persistence boundary the engine builds on.
//!
//! Two adapter families (events + audit + cursors; entities + duplicates),
//! each with two implementations: an embedded in-memory backend for
//! single-process clients and a Postgres backend for the multi-tenant
//! server. A third, small adapter persists opaque auth tokens on clients.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod search;
mod subtree;

pub use adapter::{
    AuthTokenStorageAdapter, EntityStorageAdapter, EventPage, EventStorageAdapter,
};
pub use error::{StorageError, StorageResult};
pub use memory::{
    MemoryAuthTokenAdapter, MemoryEntityStorageAdapter, MemoryEventStorageAdapter,
};
pub use postgres::{PgEntityStorageAdapter, PgEventStorageAdapter};
pub use search::SearchCriteria;
