//! Online-session, accounting and auth-log storage
//!
//! At most one online session exists per Acct-Session-Id. Backends make
//! [`SessionStore::insert_online`] and [`SessionStore::upsert_online`] atomic
//! per key; nothing above this layer takes locks.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::StoreError;
use crate::models::{AccountingRecord, AuthLog, OnlineSession};
use async_trait::async_trait;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new online session; an existing one with the same id is
    /// left untouched and reported as [`StoreError::Duplicate`].
    async fn insert_online(&self, session: &OnlineSession) -> Result<(), StoreError>;

    /// Insert the session if absent, otherwise add its octet and packet
    /// counters to the stored ones.
    async fn upsert_online(&self, session: &OnlineSession) -> Result<(), StoreError>;

    async fn get_online(&self, acct_session_id: &str) -> Result<Option<OnlineSession>, StoreError>;

    /// Returns the number of sessions removed.
    async fn delete_online(&self, acct_session_id: &str) -> Result<u64, StoreError>;

    /// Remove every session reported by the NAS with this address or identifier.
    async fn delete_online_by_nas(&self, nas_addr: &str, nas_id: &str) -> Result<u64, StoreError>;

    async fn count_online(&self, username: &str) -> Result<u64, StoreError>;

    async fn insert_accounting(&self, record: &AccountingRecord) -> Result<(), StoreError>;

    async fn insert_auth_log(&self, log: &AuthLog) -> Result<(), StoreError>;
}
