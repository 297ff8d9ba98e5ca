//! Persistent job-state store
//!
//! This module provides the durable key→value persistence layer for job
//! records:
//! - Single-key atomic writes with read-your-writes visibility
//! - Full scan over all records (no snapshot semantics)
//! - Redis backend for deployments
//! - In-memory backend for tests and stand-alone use
//!
//! All higher-level atomicity (deduplication, status transitions) is built
//! by read-modify-write against this store; callers must re-`get` a record
//! before acting on anything observed during a scan.

pub mod memory;
pub mod redis;

// Re-export main types
pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::jobs::Job;

/// Store result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-specific error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Key prefix for persisted job records, `job:{job_id}`
pub const JOB_KEY_PREFIX: &str = "job:";

/// Build the persisted key for a job ID
pub fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_KEY_PREFIX, job_id)
}

/// Durable key→value persistence for job records.
///
/// `put` is atomic at the single-key level; after it returns, a subsequent
/// `get` of the same ID observes the written value. `scan` is finite but
/// carries no snapshot guarantee across keys.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Unconditionally write a job record
    async fn put(&self, job: &Job) -> StoreResult<()>;

    /// Fetch a job record by ID
    async fn get(&self, job_id: &str) -> StoreResult<Option<Job>>;

    /// Fetch every persisted job record
    async fn scan(&self) -> StoreResult<Vec<Job>>;

    /// Delete a job record; idempotent, returns whether a record existed
    async fn delete(&self, job_id: &str) -> StoreResult<bool>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> StoreResult<bool>;
}
