pub mod config;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use jobs::{
    Job, JobListing, JobPriority, JobQueue, JobStatus, QueueStats, Scheduler, SimulatedExecutor,
    SubmitReceipt, SubmitRequest, Target, TestExecutor, TestOutcome, TestRun,
};
pub use orchestrator::{init_logging, Orchestrator, SchedulerStats, SystemStats};
pub use store::{JobStore, MemoryStore, RedisStore, StoreError};

/// Current version of devicelab
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
