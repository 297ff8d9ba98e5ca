//! Group scheduler and execution driver
//!
//! A single scheduler task drives jobs from `queued` to a terminal status:
//! each tick derives the group set, binds one group at a time to an
//! available device of the matching target, and executes the locked jobs
//! sequentially through the injected `TestExecutor`.
//!
//! The store has no compare-and-swap, so the scheduler re-reads every
//! record immediately before writing it. A record that moved under us
//! (cancel, restart recovery) keeps its newer state; without the re-read a
//! stale in-memory copy could resurrect a terminal job.

use crate::error::Result;
use crate::jobs::{
    AgentPool, DeviceLease, GroupStatus, Job, JobGroup, JobQueue, JobStatus, TestExecutor,
    TestOutcome,
};
use crate::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not yet started
    Starting,

    /// Tick loop running
    Running,

    /// Shutdown requested
    Stopping,

    /// Tick loop exited
    Stopped,
}

/// Drives jobs from `queued` to a terminal status
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<JobQueue>,
    pool: Arc<RwLock<AgentPool>>,
    executor: Arc<dyn TestExecutor>,
    tick_interval: Duration,
    state: Arc<RwLock<SchedulerState>>,
}

impl Scheduler {
    /// Create a scheduler over shared components
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<JobQueue>,
        pool: Arc<RwLock<AgentPool>>,
        executor: Arc<dyn TestExecutor>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            pool,
            executor,
            tick_interval,
            state: Arc::new(RwLock::new(SchedulerState::Starting)),
        }
    }

    /// Run startup recovery, then the periodic tick loop until `stop()`
    pub async fn start(self: Arc<Self>) -> JoinHandle<()> {
        *self.state.write().await = SchedulerState::Running;
        info!(tick_interval_secs = self.tick_interval.as_secs(), "scheduler starting");

        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.recover().await {
                error!(error = %e, "startup recovery failed, continuing with tick loop");
            }

            while *scheduler.state.read().await == SchedulerState::Running {
                if let Err(e) = scheduler.tick().await {
                    // store outage: abandon this tick, retry on the next
                    error!(error = %e, "tick abandoned");
                }
                tokio::time::sleep(scheduler.tick_interval).await;
            }

            *scheduler.state.write().await = SchedulerState::Stopped;
            info!("scheduler stopped");
        })
    }

    /// Request shutdown; the loop exits after the in-flight tick
    pub async fn stop(&self) {
        info!("stopping scheduler");
        *self.state.write().await = SchedulerState::Stopping;
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Startup recovery: requeue every job left `scheduled` or `running` by
    /// a previous process.
    ///
    /// Agents and devices are process-local, so any in-flight work is
    /// orphaned after a restart and must become eligible again. Recovery
    /// never consumes a retry. Best-effort: a record that fails to reset is
    /// logged and skipped.
    pub async fn recover(&self) -> Result<usize> {
        let jobs = self.store.scan().await?;
        let mut reset = 0;

        for mut job in jobs {
            if !matches!(job.status, JobStatus::Scheduled | JobStatus::Running) {
                continue;
            }
            let prior_status = job.status;
            job.reset_after_restart();
            match self.store.put(&job).await {
                Ok(()) => {
                    reset += 1;
                    info!(
                        job_id = %job.job_id,
                        group_id = %job.group_id,
                        prior_status = %prior_status,
                        "requeued job orphaned by restart"
                    );
                }
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "failed to reset orphaned job");
                }
            }
        }

        if reset > 0 {
            info!(count = reset, "startup recovery complete");
        }
        Ok(reset)
    }

    /// One scheduling pass over all groups
    pub async fn tick(&self) -> Result<()> {
        let stats = self.queue.stats().await?;
        if stats.waiting == 0 {
            return Ok(());
        }

        for group in self.queue.job_groups().await? {
            match group.status() {
                GroupStatus::Queued | GroupStatus::Running => {
                    self.process_group(&group).await?;
                }
                GroupStatus::Completed | GroupStatus::Failed => {}
            }
        }
        Ok(())
    }

    /// Assign one group to a device and execute its jobs sequentially.
    ///
    /// Members already `scheduled` take precedence: they were locked by a
    /// previous pass (or a crashed tick) and keep their device binding if
    /// that device is free. Otherwise the queued members are locked against
    /// a freshly selected device.
    async fn process_group(&self, group: &JobGroup) -> Result<()> {
        let scheduled: Vec<&Job> = group
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Scheduled)
            .collect();

        let (lease, candidates) = if !scheduled.is_empty() {
            let bound = scheduled.iter().find_map(|j| match (&j.agent_id, &j.device_id) {
                (Some(agent_id), Some(device_id)) => Some(DeviceLease {
                    agent_id: agent_id.clone(),
                    device_id: device_id.clone(),
                }),
                _ => None,
            });
            let Some(lease) = bound else {
                warn!(group_id = %group.group_id, "scheduled jobs without a device binding");
                return Ok(());
            };
            if !self.pool.read().await.device_available(&lease.device_id) {
                debug!(
                    group_id = %group.group_id,
                    device_id = %lease.device_id,
                    "bound device busy, deferring group"
                );
                return Ok(());
            }
            let candidates: Vec<Job> = scheduled.into_iter().cloned().collect();
            (lease, candidates)
        } else {
            let queued: Vec<Job> = group
                .jobs
                .iter()
                .filter(|j| j.status == JobStatus::Queued)
                .cloned()
                .collect();
            if queued.is_empty() {
                return Ok(());
            }
            let Some(lease) = self.pool.read().await.find_available(group.target) else {
                debug!(
                    group_id = %group.group_id,
                    target = %group.target,
                    "no capacity, deferring group"
                );
                return Ok(());
            };
            (lease, queued)
        };

        // Lock step: re-read each candidate and bind it to the lease. A job
        // that moved since the scan is accepted only if it is already
        // scheduled on this agent.
        let mut locked = Vec::new();
        for candidate in &candidates {
            let Some(mut current) = self.store.get(&candidate.job_id).await? else {
                continue;
            };
            match current.status {
                JobStatus::Queued => {
                    current.mark_scheduled(&lease.agent_id, &lease.device_id);
                    self.store.put(&current).await?;
                    locked.push(current.job_id);
                }
                JobStatus::Scheduled
                    if current.agent_id.as_deref() == Some(lease.agent_id.as_str()) =>
                {
                    locked.push(current.job_id);
                }
                status => {
                    debug!(job_id = %current.job_id, status = %status, "job moved during lock, skipping");
                }
            }
        }

        if locked.is_empty() {
            return Ok(());
        }

        self.pool.write().await.acquire(&lease.device_id, &locked);
        info!(
            group_id = %group.group_id,
            agent_id = %lease.agent_id,
            device_id = %lease.device_id,
            jobs = locked.len(),
            "group assigned"
        );

        for job_id in &locked {
            if let Err(e) = self.execute_job(job_id).await {
                self.pool.write().await.release(&lease.device_id);
                return Err(e);
            }
        }

        self.pool.write().await.release(&lease.device_id);
        Ok(())
    }

    /// Execute one locked job on its bound device.
    ///
    /// The record is re-read before the running transition and again after
    /// execution; a terminal status observed at either point is honored and
    /// the run's outcome discarded.
    async fn execute_job(&self, job_id: &str) -> Result<()> {
        let Some(mut job) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if job.is_terminal() {
            debug!(job_id, status = %job.status, "skipping terminal job");
            return Ok(());
        }

        job.mark_running();
        self.store.put(&job).await?;
        info!(
            job_id = %job.job_id,
            test_path = %job.test_path,
            device_id = job.device_id.as_deref().unwrap_or("-"),
            "test started"
        );

        let run = self.executor.run(&job).await;

        let Some(mut current) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if current.is_terminal() {
            info!(
                job_id = %current.job_id,
                status = %current.status,
                "job reached a terminal state during execution, outcome discarded"
            );
            return Ok(());
        }

        match run {
            Ok(run) if run.outcome == TestOutcome::Pass => {
                current.mark_completed(run.detail);
                info!(
                    job_id = %current.job_id,
                    duration_ms = run.duration.as_millis() as u64,
                    "test passed"
                );
            }
            Ok(run) => {
                current.mark_failed(run.detail);
                warn!(
                    job_id = %current.job_id,
                    duration_ms = run.duration.as_millis() as u64,
                    "test failed"
                );
            }
            Err(e) => {
                current.mark_failed(e.to_string());
                warn!(job_id = %current.job_id, error = %e, "executor error");
            }
        }
        self.store.put(&current).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, QueueSettings};
    use crate::jobs::{JobPriority, SimulatedExecutor, SubmitRequest, Target, TestRun};
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn build(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn TestExecutor>,
    ) -> (Arc<JobQueue>, Arc<Scheduler>) {
        let queue = Arc::new(JobQueue::new(store.clone(), QueueSettings::default()));
        let pool = Arc::new(RwLock::new(AgentPool::from_config(&Config::default().pool)));
        let scheduler = Arc::new(Scheduler::new(
            store,
            queue.clone(),
            pool,
            executor,
            Duration::from_millis(10),
        ));
        (queue, scheduler)
    }

    fn request(test_path: &str) -> SubmitRequest {
        SubmitRequest::new("acme", "v1", test_path, Target::Emulator)
    }

    /// Executor that records execution order
    struct RecordingExecutor {
        order: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        fn new() -> Self {
            Self {
                order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl TestExecutor for RecordingExecutor {
        async fn run(&self, job: &Job) -> crate::Result<TestRun> {
            self.order.lock().unwrap().push(job.job_id.clone());
            Ok(TestRun {
                outcome: TestOutcome::Pass,
                detail: format!("{} passed", job.test_path),
                duration: Duration::ZERO,
            })
        }
    }

    /// Executor that cancels its own job mid-run
    struct CancellingExecutor {
        queue: Mutex<Option<Arc<JobQueue>>>,
    }

    #[async_trait::async_trait]
    impl TestExecutor for CancellingExecutor {
        async fn run(&self, job: &Job) -> crate::Result<TestRun> {
            let queue = self.queue.lock().unwrap().clone().unwrap();
            queue.cancel(&job.job_id).await.unwrap();
            Ok(TestRun {
                outcome: TestOutcome::Pass,
                detail: "finished after cancel".to_string(),
                duration: Duration::ZERO,
            })
        }
    }

    /// Store wrapper that can be switched into a failing mode
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failing: AtomicBool::new(false),
            }
        }

        fn check(&self) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Operation("store offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl JobStore for FlakyStore {
        async fn put(&self, job: &Job) -> StoreResult<()> {
            self.check()?;
            self.inner.put(job).await
        }

        async fn get(&self, job_id: &str) -> StoreResult<Option<Job>> {
            self.check()?;
            self.inner.get(job_id).await
        }

        async fn scan(&self) -> StoreResult<Vec<Job>> {
            self.check()?;
            self.inner.scan().await
        }

        async fn delete(&self, job_id: &str) -> StoreResult<bool> {
            self.check()?;
            self.inner.delete(job_id).await
        }

        async fn health_check(&self) -> StoreResult<bool> {
            Ok(!self.failing.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn test_happy_path_single_job() {
        let store = Arc::new(MemoryStore::new());
        let (queue, scheduler) = build(store, Arc::new(SimulatedExecutor::instant(1.0)));

        let receipt = queue.submit(request("a.spec")).await.unwrap();
        scheduler.tick().await.unwrap();

        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
        assert_eq!(job.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(job.device_id.as_deref(), Some("emulator-1"));
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
    }

    #[tokio::test]
    async fn test_group_executes_in_priority_order() {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(RecordingExecutor::new());
        let (queue, scheduler) = build(store, executor.clone());

        let low = queue
            .submit(request("low.spec").with_priority(JobPriority::Low))
            .await
            .unwrap();
        let high = queue
            .submit(request("high.spec").with_priority(JobPriority::High))
            .await
            .unwrap();
        let medium = queue
            .submit(request("medium.spec").with_priority(JobPriority::Medium))
            .await
            .unwrap();

        scheduler.tick().await.unwrap();

        let order = executor.order.lock().unwrap().clone();
        assert_eq!(order, vec![high.job_id, medium.job_id, low.job_id]);
    }

    #[tokio::test]
    async fn test_whole_group_shares_one_device() {
        let store = Arc::new(MemoryStore::new());
        let (queue, scheduler) = build(store, Arc::new(SimulatedExecutor::instant(1.0)));

        let a = queue.submit(request("a.spec")).await.unwrap();
        let b = queue.submit(request("b.spec")).await.unwrap();
        scheduler.tick().await.unwrap();

        let a = queue.get(&a.job_id).await.unwrap();
        let b = queue.get(&b.job_id).await.unwrap();
        assert_eq!(a.device_id, b.device_id);
        assert_eq!(a.status, JobStatus::Completed);
        assert_eq!(b.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_run_records_error() {
        let store = Arc::new(MemoryStore::new());
        let (queue, scheduler) = build(store, Arc::new(SimulatedExecutor::instant(0.0)));

        let receipt = queue.submit(request("a.spec")).await.unwrap();
        scheduler.tick().await.unwrap();

        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("a.spec"));
        assert!(job.result.is_none());
        assert_ne!(job.progress, 100);

        // retry re-queues; the next tick runs it again
        queue.retry(&receipt.job_id).await.unwrap();
        scheduler.tick().await.unwrap();

        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_tick_is_not_executed() {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(RecordingExecutor::new());
        let (queue, scheduler) = build(store, executor.clone());

        let receipt = queue.submit(request("a.spec")).await.unwrap();
        queue.cancel(&receipt.job_id).await.unwrap();
        scheduler.tick().await.unwrap();

        assert!(executor.order.lock().unwrap().is_empty());
        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_during_execution_wins() {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(CancellingExecutor {
            queue: Mutex::new(None),
        });
        let (queue, scheduler) = build(store, executor.clone());
        *executor.queue.lock().unwrap() = Some(queue.clone());

        let receipt = queue.submit(request("a.spec")).await.unwrap();
        scheduler.tick().await.unwrap();

        // the run finished with pass, but the cancel landed first
        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
        assert_ne!(job.progress, 100);
    }

    #[tokio::test]
    async fn test_scheduled_jobs_resume_on_bound_device() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let (queue, scheduler) = build(store.clone(), Arc::new(SimulatedExecutor::instant(1.0)));

        // a job locked by a previous pass that never reached execution
        let receipt = queue.submit(request("a.spec")).await.unwrap();
        let mut job = queue.get(&receipt.job_id).await.unwrap();
        job.mark_scheduled("agent-3", "emulator-3");
        store.put(&job).await.unwrap();

        scheduler.tick().await.unwrap();

        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        // binding survives: the group reused emulator-3, not emulator-1
        assert_eq!(job.agent_id.as_deref(), Some("agent-3"));
        assert_eq!(job.device_id.as_deref(), Some("emulator-3"));
    }

    #[tokio::test]
    async fn test_no_capacity_defers_group() {
        let store = Arc::new(MemoryStore::new());
        let (queue, scheduler) = build(store, Arc::new(SimulatedExecutor::instant(1.0)));

        {
            let mut pool = scheduler.pool.write().await;
            for id in [
                "browserstack-1",
                "browserstack-2",
                "browserstack-3",
                "browserstack-4",
                "browserstack-5",
            ] {
                pool.acquire(id, &["job_other".to_string()]);
            }
        }

        let receipt = queue
            .submit(SubmitRequest::new("acme", "v1", "a.spec", Target::Browserstack))
            .await
            .unwrap();
        scheduler.tick().await.unwrap();

        // saturated target: still queued, never assigned to an emulator slot
        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.device_id.is_none());

        scheduler.pool.write().await.release("browserstack-2");
        scheduler.tick().await.unwrap();

        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.device_id.as_deref(), Some("browserstack-2"));
    }

    #[tokio::test]
    async fn test_recovery_requeues_orphaned_jobs() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let (queue, scheduler) = build(store.clone(), Arc::new(SimulatedExecutor::instant(1.0)));

        let running = queue.submit(request("running.spec")).await.unwrap();
        let mut job = queue.get(&running.job_id).await.unwrap();
        job.mark_scheduled("agent-1", "emulator-1");
        job.mark_running();
        store.put(&job).await.unwrap();

        let scheduled = queue.submit(request("scheduled.spec")).await.unwrap();
        let mut job = queue.get(&scheduled.job_id).await.unwrap();
        job.mark_scheduled("agent-2", "emulator-2");
        store.put(&job).await.unwrap();

        let queued = queue.submit(request("queued.spec")).await.unwrap();
        let done = queue.submit(request("done.spec")).await.unwrap();
        let mut job = queue.get(&done.job_id).await.unwrap();
        job.mark_completed("passed".to_string());
        store.put(&job).await.unwrap();

        let reset = scheduler.recover().await.unwrap();
        assert_eq!(reset, 2);

        for id in [&running.job_id, &scheduled.job_id] {
            let job = queue.get(id).await.unwrap();
            assert_eq!(job.status, JobStatus::Queued);
            assert!(job.agent_id.is_none());
            assert!(job.device_id.is_none());
            assert!(job.started_at.is_none());
            assert_eq!(job.error.as_deref(), Some(Job::RESTART_RESET));
            assert_eq!(job.retry_count, 0);
        }

        let job = queue.get(&queued.job_id).await.unwrap();
        assert!(job.error.is_none());
        let job = queue.get(&done.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_store_outage_abandons_tick() {
        let store = Arc::new(FlakyStore::new());
        let (queue, scheduler) = build(store.clone(), Arc::new(SimulatedExecutor::instant(1.0)));

        let receipt = queue.submit(request("a.spec")).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        assert!(scheduler.tick().await.is_err());

        // next tick succeeds once the store is back
        store.failing.store(false, Ordering::SeqCst);
        scheduler.tick().await.unwrap();
        let job = queue.get(&receipt.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Arc::new(MemoryStore::new());
        let (_queue, scheduler) = build(store, Arc::new(SimulatedExecutor::instant(1.0)));

        let scheduler = scheduler.clone();
        let handle = scheduler.clone().start().await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);

        scheduler.stop().await;
        handle.await.unwrap();
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
    }
}
