//! Job intake and read API
//!
//! The queue is the submission gateway: it validates payloads, deduplicates
//! concurrent submissions, and owns the caller-facing transitions (cancel,
//! retry). All reads are point-in-time snapshots over a store scan and may
//! race scheduler writes; the store has no compare-and-swap, so every
//! mutation here re-reads the record before writing it back.

use crate::config::QueueSettings;
use crate::error::{Error, Result};
use crate::jobs::{
    collect_groups, GroupSummary, Job, JobGroup, JobStatus, SubmitReceipt, SubmitRequest,
};
use crate::store::JobStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// Submission gateway and read API over the job store
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    settings: QueueSettings,
}

impl JobQueue {
    /// Create a queue over a store
    pub fn new(store: Arc<dyn JobStore>, settings: QueueSettings) -> Self {
        Self { store, settings }
    }

    /// Submit a test-execution request.
    ///
    /// A submission matching an existing job on `(org_id, app_version_id,
    /// test_path, target)` while that job is queued, scheduled or running
    /// is deduplicated: the existing job's ID is returned and nothing is
    /// written.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitReceipt> {
        req.validate()
            .map_err(|e| Error::validation(format!("invalid submission: {}", e)))?;
        if let Some(progress) = req.progress {
            if progress > 100 {
                return Err(Error::validation("progress must be within 0..=100"));
            }
        }
        if let Some(retry_count) = req.retry_count {
            let max_retries = req.max_retries.unwrap_or(self.settings.max_retries);
            if retry_count > max_retries {
                return Err(Error::validation("retry_count must not exceed max_retries"));
            }
        }

        let target = req.resolved_target(self.settings.default_target);
        let existing = self.store.scan().await?;
        if let Some(duplicate) = existing
            .iter()
            .find(|j| j.status.is_active() && j.matches_submission(&req, target))
        {
            debug!(
                job_id = %duplicate.job_id,
                group_id = %duplicate.group_id,
                "submission deduplicated"
            );
            return Ok(SubmitReceipt {
                job_id: duplicate.job_id.clone(),
                status: duplicate.status,
                message: "duplicate".to_string(),
            });
        }

        let job = Job::from_request(req, &self.settings);
        self.store.put(&job).await?;
        info!(
            job_id = %job.job_id,
            group_id = %job.group_id,
            priority = %job.priority,
            "job submitted"
        );
        Ok(SubmitReceipt {
            job_id: job.job_id,
            status: job.status,
            message: "queued".to_string(),
        })
    }

    /// Fetch a job by ID
    pub async fn get(&self, job_id: &str) -> Result<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("job {}", job_id)))
    }

    /// List an organization's jobs, optionally filtered by status
    pub async fn list(&self, org_id: &str, status: Option<JobStatus>) -> Result<JobListing> {
        let mut jobs: Vec<Job> = self
            .store
            .scan()
            .await?
            .into_iter()
            .filter(|j| j.org_id == org_id)
            .filter(|j| status.map_or(true, |s| j.status == s))
            .collect();
        jobs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(JobListing {
            org_id: org_id.to_string(),
            status_filter: status,
            count: jobs.len(),
            jobs,
        })
    }

    /// Cancel a job.
    ///
    /// Rejected once the job is terminal. Cancel racing the scheduler is
    /// last-writer-wins: the scheduler re-reads before execution and honors
    /// the terminal status.
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            return Err(Error::invalid_state(format!(
                "cannot cancel job {} in status {}",
                job.job_id, job.status
            )));
        }
        job.mark_cancelled();
        self.store.put(&job).await?;
        info!(job_id = %job.job_id, "job cancelled");
        Ok(job)
    }

    /// Re-queue a failed job, consuming one retry.
    ///
    /// Only `failed` and `retrying` jobs are retriable. Once the retry
    /// budget is spent the job is pinned to `failed` with the canonical
    /// error and the call is rejected.
    pub async fn retry(&self, job_id: &str) -> Result<Job> {
        let mut job = self.get(job_id).await?;
        if !job.status.is_retryable() {
            return Err(Error::invalid_state(format!(
                "cannot retry job {} in status {}",
                job.job_id, job.status
            )));
        }
        if job.retry_count >= job.max_retries {
            job.status = JobStatus::Failed;
            job.error = Some(Job::MAX_RETRIES_EXCEEDED.to_string());
            self.store.put(&job).await?;
            return Err(Error::invalid_state(Job::MAX_RETRIES_EXCEEDED));
        }

        job.reset_for_retry();
        self.store.put(&job).await?;
        info!(
            job_id = %job.job_id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "job requeued for retry"
        );
        Ok(job)
    }

    /// Queue counters over a full scan
    pub async fn stats(&self) -> Result<QueueStats> {
        let jobs = self.store.scan().await?;
        let mut stats = QueueStats::default();
        let mut group_ids = HashSet::new();

        for job in &jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Queued | JobStatus::Scheduled => stats.waiting += 1,
                JobStatus::Running => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled | JobStatus::Retrying => {}
            }
            if !job.is_terminal() {
                group_ids.insert(job.group_id.as_str());
            }
        }
        stats.groups = group_ids.len();

        Ok(stats)
    }

    /// Summaries of all non-terminal groups
    pub async fn groups(&self) -> Result<Vec<GroupSummary>> {
        Ok(self.job_groups().await?.iter().map(JobGroup::summary).collect())
    }

    /// Non-terminal groups with members, for the scheduler
    pub async fn job_groups(&self) -> Result<Vec<JobGroup>> {
        Ok(collect_groups(self.store.scan().await?))
    }

    /// Defaults applied to submissions
    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }
}

/// Result of a list query
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub org_id: String,
    pub status_filter: Option<JobStatus>,
    pub count: usize,
    pub jobs: Vec<Job>,
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    /// Jobs queued or scheduled
    pub waiting: usize,

    /// Jobs running
    pub active: usize,

    pub completed: usize,
    pub failed: usize,
    pub total: usize,

    /// Distinct non-terminal group IDs
    pub groups: usize,
}
