use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SessionData, SessionError, store::SessionStore};

#[derive(Debug, Clone)]
struct Record {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// In-process [`SessionStore`]; a single write lock makes rotation atomic.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<Vec<u8>, Record>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<SessionData>, SessionError> {
        Ok(self
            .records
            .read()
            .await
            .get(token_hash)
            .filter(|record| record.expires_at > now)
            .map(|record| record.data.clone()))
    }

    async fn create(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.records.write().await.insert(
            token_hash.to_vec(),
            Record {
                data: data.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn commit(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let mut records = self.records.write().await;
        match records.get_mut(token_hash) {
            Some(record) if record.expires_at > now => {
                record.data = data.clone();
                record.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate(
        &self,
        old_hash: Option<&[u8]>,
        new_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let mut records = self.records.write().await;
        if let Some(old_hash) = old_hash {
            if records.remove(old_hash).is_none() {
                return Ok(false);
            }
        }
        records.insert(
            new_hash.to_vec(),
            Record {
                data: data.clone(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<(), SessionError> {
        self.records.write().await.remove(token_hash);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}
