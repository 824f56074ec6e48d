//! In-memory session store

use super::SessionStore;
use crate::error::StoreError;
use crate::models::{is_set, AccountingRecord, AuthLog, OnlineSession};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;

/// Store for single-node deployments and tests.
///
/// Online sessions sit in a `DashMap`, so per-key insert and upsert are
/// atomic. Accounting records and auth logs are append-only vectors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    online: DashMap<String, OnlineSession>,
    accounting: RwLock<Vec<AccountingRecord>>,
    auth_logs: RwLock<Vec<AuthLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub async fn accounting_records(&self) -> Vec<AccountingRecord> {
        self.accounting.read().await.clone()
    }

    pub async fn auth_logs(&self) -> Vec<AuthLog> {
        self.auth_logs.read().await.clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_online(&self, session: &OnlineSession) -> Result<(), StoreError> {
        match self.online.entry(session.acct_session_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(session.acct_session_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn upsert_online(&self, session: &OnlineSession) -> Result<(), StoreError> {
        self.online
            .entry(session.acct_session_id.clone())
            .and_modify(|existing| existing.accumulate(session))
            .or_insert_with(|| session.clone());
        Ok(())
    }

    async fn get_online(&self, acct_session_id: &str) -> Result<Option<OnlineSession>, StoreError> {
        Ok(self.online.get(acct_session_id).map(|entry| entry.clone()))
    }

    async fn delete_online(&self, acct_session_id: &str) -> Result<u64, StoreError> {
        Ok(self.online.remove(acct_session_id).map_or(0, |_| 1))
    }

    async fn delete_online_by_nas(&self, nas_addr: &str, nas_id: &str) -> Result<u64, StoreError> {
        let before = self.online.len();
        self.online.retain(|_, session| {
            let addr_match = is_set(nas_addr) && session.nas_addr == nas_addr;
            let id_match = is_set(nas_id) && session.nas_id == nas_id;
            !(addr_match || id_match)
        });
        Ok(before.saturating_sub(self.online.len()) as u64)
    }

    async fn count_online(&self, username: &str) -> Result<u64, StoreError> {
        Ok(self
            .online
            .iter()
            .filter(|entry| entry.username == username)
            .count() as u64)
    }

    async fn insert_accounting(&self, record: &AccountingRecord) -> Result<(), StoreError> {
        self.accounting.write().await.push(record.clone());
        Ok(())
    }

    async fn insert_auth_log(&self, log: &AuthLog) -> Result<(), StoreError> {
        self.auth_logs.write().await.push(log.clone());
        Ok(())
    }
}
