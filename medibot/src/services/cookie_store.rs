//! In-memory backing store for the session cookie records.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion, SessionStore};

/// Session records keyed by cookie id. Expired records are dropped by
/// [`ExpiredDeletion::delete_expired`].
#[derive(Debug, Clone, Default)]
pub struct ExpiringMemoryStore {
    records: Arc<DashMap<Id, Record>>,
}

impl ExpiringMemoryStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Periodically delete expired records for the lifetime of the process.
    pub fn spawn_expiry_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let before = store.len();
                if let Err(e) = store.delete_expired().await {
                    tracing::warn!(error = %e, "Failed to delete expired session records");
                    continue;
                }
                let removed = before.saturating_sub(store.len());
                if removed > 0 {
                    tracing::debug!(removed, "Deleted expired session records");
                }
            }
        })
    }
}

fn is_live(record: &Record, now: OffsetDateTime) -> bool {
    record.expiry_date > now
}

#[async_trait]
impl SessionStore for ExpiringMemoryStore {
    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .records
            .get(id)
            .filter(|record| is_live(record, now))
            .map(|record| record.clone()))
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        self.records.remove(id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for ExpiringMemoryStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc();
        self.records.retain(|_, record| is_live(record, now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(expiry_date: OffsetDateTime) -> Record {
        Record {
            id: Id::default(),
            data: HashMap::new(),
            expiry_date,
        }
    }

    #[tokio::test]
    async fn expired_records_are_deleted() {
        let store = ExpiringMemoryStore::default();
        let now = OffsetDateTime::now_utc();
        let live = record(now + time::Duration::minutes(30));
        let stale = record(now - time::Duration::seconds(1));

        store.save(&live).await.unwrap();
        store.save(&stale).await.unwrap();
        assert_eq!(store.len(), 2);

        store.delete_expired().await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.load(&live.id).await.unwrap().is_some());
        assert!(store.load(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_record_is_not_loaded() {
        let store = ExpiringMemoryStore::default();
        let stale = record(OffsetDateTime::now_utc() - time::Duration::seconds(1));
        store.save(&stale).await.unwrap();

        assert!(store.load(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = ExpiringMemoryStore::default();
        let live = record(OffsetDateTime::now_utc() + time::Duration::minutes(5));
        store.save(&live).await.unwrap();

        store.delete(&live.id).await.unwrap();
        assert!(store.is_empty());
    }
}
