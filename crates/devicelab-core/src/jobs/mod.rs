//! Job queue, grouping and scheduling subsystem
//!
//! This module provides the orchestrator core for UI test runs:
//! - Durable job records with atomic status transitions
//! - Deduplication across concurrent submissions
//! - Grouping of compatible jobs into work-units
//! - Assignment against a finite, typed agent/device pool
//! - Sequential execution inside a group with mid-flight recovery
//! - Progress and retry accounting that survives restarts
//!
//! ## Architecture
//!
//! The job store (see `crate::store`) owns every job record; the queue and
//! scheduler hold only transient copies that are read-modify-written back.
//! A single scheduler task ticks periodically: it derives groups from a
//! scan, locks each group's jobs to one device of the matching target, and
//! drives them to a terminal status through the injected `TestExecutor`.
//! On startup, recovery requeues whatever a previous process left behind.

pub mod executor;
pub mod group;
pub mod job;
pub mod pool;
pub mod queue;
pub mod scheduler;

// Re-export main types
pub use executor::{SimulatedExecutor, TestExecutor, TestOutcome, TestRun};
pub use group::{collect_groups, GroupStatus, GroupSummary, JobGroup};
pub use job::{Job, JobPriority, JobStatus, SubmitReceipt, SubmitRequest, Target};
pub use pool::{
    Agent, AgentPool, AgentStatus, Device, DeviceLease, DeviceSnapshot, DeviceStatus, PoolStats,
};
pub use queue::{JobListing, JobQueue, QueueStats};
pub use scheduler::{Scheduler, SchedulerState};
