//! Redis-backed job store

use crate::config::StoreConfig;
use crate::jobs::Job;
use crate::store::{job_key, JobStore, StoreError, StoreResult, JOB_KEY_PREFIX};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{info, warn};

/// Job store on a Redis endpoint.
///
/// Records live at `job:{job_id}` as JSON. The connection manager
/// re-establishes dropped connections on its own; only the initial
/// connection is retried here, bounded by `connect_attempts`.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    url: String,
}

impl RedisStore {
    /// Connect to the configured endpoint
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::open(&config.url[..])
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut attempt = 0;
        let manager = loop {
            attempt += 1;
            match client.get_connection_manager().await {
                Ok(manager) => break manager,
                Err(e) if attempt < config.connect_attempts => {
                    warn!(
                        url = %config.url,
                        attempt,
                        error = %e,
                        "store connection attempt failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay()).await;
                }
                Err(e) => {
                    return Err(StoreError::Connection(format!(
                        "failed to connect after {} attempts: {}",
                        attempt, e
                    )));
                }
            }
        };

        info!(url = %config.url, "job store connected");
        Ok(Self {
            manager,
            url: config.url.clone(),
        })
    }

    /// Endpoint this store is bound to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl JobStore for RedisStore {
    async fn put(&self, job: &Job) -> StoreResult<()> {
        let raw = serde_json::to_string(job)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(job_key(&job.job_id), raw)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<Job>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(job_key(job_id))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        match raw {
            Some(raw) => {
                let job = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn scan(&self) -> StoreResult<Vec<Job>> {
        let mut conn = self.manager.clone();

        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(format!("{}*", JOB_KEY_PREFIX))
                .await
                .map_err(|e| StoreError::Operation(e.to_string()))?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            // a record may vanish between SCAN and GET; that is not an error
            let raw: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| StoreError::Operation(e.to_string()))?;
            if let Some(raw) = raw {
                let job: Job = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn delete(&self, job_id: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(job_key(job_id))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let probe: Result<Option<String>, _> = conn.get(job_key("__health__")).await;
        match probe {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(url = %self.url, error = %e, "store health check failed");
                Ok(false)
            }
        }
    }
}
