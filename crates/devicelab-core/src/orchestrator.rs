//! Component wiring and combined read APIs
//!
//! The orchestrator assembles the store, queue, pool and scheduler from a
//! `Config` and owns the scheduler's lifetime. Components are explicit
//! values handed to whatever boundary embeds the core; nothing here is a
//! process-wide global.

use crate::config::{Config, LoggingConfig};
use crate::error::Result;
use crate::jobs::{
    AgentPool, DeviceSnapshot, JobQueue, QueueStats, Scheduler, SimulatedExecutor, TestExecutor,
};
use crate::store::{JobStore, MemoryStore, RedisStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

/// Assembled orchestrator core
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    queue: Arc<JobQueue>,
    pool: Arc<RwLock<AgentPool>>,
    scheduler: Arc<Scheduler>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Connect to the configured Redis store and assemble the core
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn JobStore> = Arc::new(RedisStore::connect(&config.store).await?);
        Ok(Self::assemble(
            config,
            store,
            Arc::new(SimulatedExecutor::default()),
        ))
    }

    /// Assemble the core over an in-memory store (stand-alone mode, tests)
    pub fn in_memory(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(SimulatedExecutor::default()),
        ))
    }

    /// Assemble the core over explicit store and executor implementations
    pub fn with_store(
        config: Config,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn TestExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, store, executor))
    }

    fn assemble(
        config: Config,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn TestExecutor>,
    ) -> Self {
        let queue = Arc::new(JobQueue::new(store.clone(), config.queue.clone()));
        let pool = Arc::new(RwLock::new(AgentPool::from_config(&config.pool)));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            queue.clone(),
            pool.clone(),
            executor,
            config.scheduler.tick_interval(),
        ));

        Self {
            store,
            queue,
            pool,
            scheduler,
            handle: Mutex::new(None),
        }
    }

    /// Submission gateway and read API
    pub fn queue(&self) -> Arc<JobQueue> {
        self.queue.clone()
    }

    /// Scheduler handle, for deterministic ticking in tests
    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    /// Start the scheduler (recovery pass, then the tick loop)
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }
        *handle = Some(self.scheduler.clone().start().await);
        info!("orchestrator started");
    }

    /// Stop the scheduler and wait for the tick loop to exit
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("orchestrator stopped");
    }

    /// Combined queue and scheduler statistics
    pub async fn stats(&self) -> Result<SystemStats> {
        let queue = self.queue.stats().await?;
        let pool = self.pool.read().await.stats();
        Ok(SystemStats {
            scheduler: SchedulerStats {
                agents: pool.agents,
                devices: pool.devices,
                running_jobs: queue.active,
            },
            queue,
        })
    }

    /// Flat device list
    pub async fn devices(&self) -> Vec<DeviceSnapshot> {
        self.pool.read().await.devices()
    }

    /// Whether the backing store is reachable
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await.unwrap_or(false)
    }
}

/// Combined statistics for the read API
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SystemStats {
    pub queue: QueueStats,
    pub scheduler: SchedulerStats,
}

/// Scheduler-side counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulerStats {
    pub agents: usize,
    pub devices: usize,
    pub running_jobs: usize,
}

/// Install the global tracing subscriber from logging configuration
pub fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    if config.json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}
