//! In-memory job store for tests and stand-alone mode

use crate::jobs::Job;
use crate::store::{job_key, JobStore, StoreError, StoreResult};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process job store.
///
/// Records are held as the same JSON serialization the Redis backend
/// persists, so the wire format is exercised on every put/get.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryStore {
    async fn put(&self, job: &Job) -> StoreResult<()> {
        let raw = serde_json::to_string(job)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.records.write().await.insert(job_key(&job.job_id), raw);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<Job>> {
        let records = self.records.read().await;
        match records.get(&job_key(job_id)) {
            Some(raw) => {
                let job = serde_json::from_str(raw)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn scan(&self) -> StoreResult<Vec<Job>> {
        let records = self.records.read().await;
        let mut jobs = Vec::with_capacity(records.len());
        for raw in records.values() {
            let job: Job = serde_json::from_str(raw)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    async fn delete(&self, job_id: &str) -> StoreResult<bool> {
        Ok(self.records.write().await.remove(&job_key(job_id)).is_some())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Job, JobPriority, Target};

    fn sample_job(job_id: &str) -> Job {
        Job::new(
            job_id.to_string(),
            "acme".to_string(),
            "v1".to_string(),
            "checkout.spec".to_string(),
            Target::Emulator,
            JobPriority::Medium,
            3,
        )
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        let job = sample_job("job_1");

        store.put(&job).await.unwrap();
        let loaded = store.get("job_1").await.unwrap().unwrap();

        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.group_id, job.group_id);
        assert_eq!(loaded.status, job.status);
        assert_eq!(loaded.timestamp, job.timestamp);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(store.get("job_unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_read_your_writes() {
        let store = MemoryStore::new();
        let mut job = sample_job("job_1");

        store.put(&job).await.unwrap();
        job.mark_cancelled();
        store.put(&job).await.unwrap();

        let loaded = store.get("job_1").await.unwrap().unwrap();
        assert!(loaded.status.is_terminal());
    }

    #[tokio::test]
    async fn test_scan_and_delete() {
        let store = MemoryStore::new();
        store.put(&sample_job("job_1")).await.unwrap();
        store.put(&sample_job("job_2")).await.unwrap();

        assert_eq!(store.scan().await.unwrap().len(), 2);

        assert!(store.delete("job_1").await.unwrap());
        assert!(!store.delete("job_1").await.unwrap());
        assert_eq!(store.scan().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_serialized_record_is_stable() {
        let store = MemoryStore::new();
        let job = sample_job("job_1");
        store.put(&job).await.unwrap();

        let first = store.records.read().await.get(&job_key("job_1")).cloned().unwrap();
        let reloaded = store.get("job_1").await.unwrap().unwrap();
        store.put(&reloaded).await.unwrap();
        let second = store.records.read().await.get(&job_key("job_1")).cloned().unwrap();

        assert_eq!(first, second);
    }
}
