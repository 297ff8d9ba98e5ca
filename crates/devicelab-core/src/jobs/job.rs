//! Job record and submission types

use crate::config::QueueSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Execution target for a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Android/iOS emulator slot
    Emulator,

    /// Physical device slot
    Device,

    /// Cloud browser slot
    Browserstack,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Target {
    /// Wire form of the target
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Emulator => "emulator",
            Target::Device => "device",
            Target::Browserstack => "browserstack",
        }
    }

    /// Create from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "emulator" => Some(Target::Emulator),
            "device" => Some(Target::Device),
            "browserstack" => Some(Target::Browserstack),
            _ => None,
        }
    }
}

/// Job priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Low priority jobs (scheduled last)
    Low = 1,

    /// Medium priority jobs (default)
    Medium = 2,

    /// High priority jobs (scheduled first)
    High = 3,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Medium
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPriority::Low => write!(f, "low"),
            JobPriority::Medium => write!(f, "medium"),
            JobPriority::High => write!(f, "high"),
        }
    }
}

impl JobPriority {
    /// Numeric rank; higher schedules first
    pub fn rank(&self) -> u8 {
        match self {
            JobPriority::Low => 1,
            JobPriority::Medium => 2,
            JobPriority::High => 3,
        }
    }

    /// Create from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(JobPriority::Low),
            "medium" => Some(JobPriority::Medium),
            "high" => Some(JobPriority::High),
            _ => None,
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for assignment
    Queued,

    /// Locked to an agent/device, not yet executing
    Scheduled,

    /// Executing on a device
    Running,

    /// Test run finished and passed
    Completed,

    /// Test run finished and failed, or retries exhausted
    Failed,

    /// Cancelled by the submitter
    Cancelled,

    /// Awaiting a retry decision (importable state)
    Retrying,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Scheduled => write!(f, "scheduled"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Retrying => write!(f, "retrying"),
        }
    }
}

impl JobStatus {
    /// Check if status is terminal (won't change without retry())
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if the job occupies a dedup slot (queued, scheduled or running)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Scheduled | JobStatus::Running
        )
    }

    /// Check if retry() may depart from this status
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Retrying)
    }

    /// Create from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(JobStatus::Queued),
            "scheduled" => Some(JobStatus::Scheduled),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            "retrying" => Some(JobStatus::Retrying),
            _ => None,
        }
    }
}

/// A single test-execution request with lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub job_id: String,

    /// Submitting organization
    pub org_id: String,

    /// Application build under test
    pub app_version_id: String,

    /// Test file/suite to run
    pub test_path: String,

    /// Execution target
    pub target: Target,

    /// Scheduling priority
    pub priority: JobPriority,

    /// Lifecycle status
    pub status: JobStatus,

    /// Completion percentage, 0–100; 100 exactly when completed
    pub progress: u8,

    /// Execution artifact on success
    pub result: Option<String>,

    /// Failure/reset detail
    pub error: Option<String>,

    /// Retries consumed so far
    pub retry_count: u32,

    /// Retry budget
    pub max_retries: u32,

    /// Submission time
    pub timestamp: DateTime<Utc>,

    /// First entry into running
    pub started_at: Option<DateTime<Utc>>,

    /// Entry into a terminal status
    pub completed_at: Option<DateTime<Utc>>,

    /// Bound device, set on scheduling
    pub device_id: Option<String>,

    /// Bound agent, set on scheduling
    pub agent_id: Option<String>,

    /// Grouping key, `{org_id}_{app_version_id}_{target}`
    pub group_id: String,
}

impl Job {
    /// Error recorded when the retry budget is exhausted
    pub const MAX_RETRIES_EXCEEDED: &'static str = "Max retries exceeded";

    /// Error recorded when startup recovery requeues an orphaned job
    pub const RESTART_RESET: &'static str = "Job reset due to server restart";

    /// Create a fresh queued job
    pub fn new(
        job_id: String,
        org_id: String,
        app_version_id: String,
        test_path: String,
        target: Target,
        priority: JobPriority,
        max_retries: u32,
    ) -> Self {
        let group_id = Self::derive_group_id(&org_id, &app_version_id, target);
        Self {
            job_id,
            org_id,
            app_version_id,
            test_path,
            target,
            priority,
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
            timestamp: Utc::now(),
            started_at: None,
            completed_at: None,
            device_id: None,
            agent_id: None,
            group_id,
        }
    }

    /// Build a job from a validated submission, honoring state-import fields
    pub fn from_request(req: SubmitRequest, defaults: &QueueSettings) -> Self {
        let target = req.target.unwrap_or(defaults.default_target);
        let mut job = Self::new(
            req.job_id.unwrap_or_else(Self::generate_job_id),
            req.org_id,
            req.app_version_id,
            req.test_path,
            target,
            req.priority.unwrap_or(defaults.default_priority),
            req.max_retries.unwrap_or(defaults.max_retries),
        );
        if let Some(timestamp) = req.timestamp {
            job.timestamp = timestamp;
        }
        if let Some(status) = req.status {
            job.status = status;
        }
        if let Some(progress) = req.progress {
            job.progress = progress;
        }
        if let Some(retry_count) = req.retry_count {
            job.retry_count = retry_count;
        }
        job.started_at = req.started_at;
        job.completed_at = req.completed_at;
        job.device_id = req.device_id;
        job.agent_id = req.agent_id;
        job
    }

    /// Derive the grouping key for an identity tuple
    pub fn derive_group_id(org_id: &str, app_version_id: &str, target: Target) -> String {
        format!("{}_{}_{}", org_id, app_version_id, target)
    }

    /// Generate a job ID of the form `job_{ms-since-epoch}_{8-hex}`
    pub fn generate_job_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("job_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if this job deduplicates an incoming submission
    pub fn matches_submission(&self, req: &SubmitRequest, target: Target) -> bool {
        self.org_id == req.org_id
            && self.app_version_id == req.app_version_id
            && self.test_path == req.test_path
            && self.target == target
    }

    /// Check if retry() may re-queue this job
    pub fn can_retry(&self) -> bool {
        self.status.is_retryable() && self.retry_count < self.max_retries
    }

    /// Lock the job to an agent/device
    pub fn mark_scheduled(&mut self, agent_id: &str, device_id: &str) {
        self.status = JobStatus::Scheduled;
        self.agent_id = Some(agent_id.to_string());
        self.device_id = Some(device_id.to_string());
    }

    /// Enter running; `started_at` is set on first entry only
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Finish successfully with an execution artifact
    pub fn mark_completed(&mut self, result: String) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.progress = 100;
        self.completed_at = Some(Utc::now());
    }

    /// Finish unsuccessfully with a failure detail
    pub fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Cancel before or during execution
    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Consume one retry and return the job to the queue
    pub fn reset_for_retry(&mut self) {
        self.retry_count += 1;
        self.status = JobStatus::Queued;
        self.progress = 0;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.device_id = None;
        self.agent_id = None;
    }

    /// Requeue a job orphaned by a process restart; does not consume a retry
    pub fn reset_after_restart(&mut self) {
        self.status = JobStatus::Queued;
        self.progress = 0;
        self.error = Some(Self::RESTART_RESET.to_string());
        self.started_at = None;
        self.device_id = None;
        self.agent_id = None;
    }
}

/// Submission payload accepted by the queue.
///
/// The execution fields (`status`, `progress`, `retry_count`, `max_retries`,
/// `started_at`, `completed_at`, `device_id`, `agent_id`) pass through
/// verbatim to support state import.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1, max = 100))]
    pub org_id: String,

    #[validate(length(min = 1, max = 100))]
    pub app_version_id: String,

    #[validate(length(min = 1))]
    pub test_path: String,

    /// Execution target; falls back to the configured default
    pub target: Option<Target>,

    pub priority: Option<JobPriority>,
    pub timestamp: Option<DateTime<Utc>>,
    pub job_id: Option<String>,

    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub agent_id: Option<String>,
}

impl SubmitRequest {
    /// Create a minimal submission
    pub fn new(
        org_id: impl Into<String>,
        app_version_id: impl Into<String>,
        test_path: impl Into<String>,
        target: Target,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            app_version_id: app_version_id.into(),
            test_path: test_path.into(),
            target: Some(target),
            priority: None,
            timestamp: None,
            job_id: None,
            status: None,
            progress: None,
            retry_count: None,
            max_retries: None,
            started_at: None,
            completed_at: None,
            device_id: None,
            agent_id: None,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set an explicit job ID
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Set an explicit submission timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Resolve the effective target for this submission
    pub fn resolved_target(&self, default_target: Target) -> Target {
        self.target.unwrap_or(default_target)
    }
}

/// Outcome of a submission: the created or deduplicated job
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> QueueSettings {
        QueueSettings::default()
    }

    #[test]
    fn test_target_strings() {
        assert_eq!(Target::Browserstack.as_str(), "browserstack");
        assert_eq!(Target::from_str("EMULATOR"), Some(Target::Emulator));
        assert_eq!(Target::from_str("simulator"), None);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::High > JobPriority::Medium);
        assert!(JobPriority::Medium > JobPriority::Low);
        assert_eq!(JobPriority::High.rank(), 3);
        assert_eq!(JobPriority::default(), JobPriority::Medium);
    }

    #[test]
    fn test_status_predicates() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
        assert!(JobStatus::Scheduled.is_active());
        assert!(!JobStatus::Retrying.is_active());
        assert!(JobStatus::Failed.is_retryable());
        assert!(JobStatus::Retrying.is_retryable());
    }

    #[test]
    fn test_group_id_derivation() {
        assert_eq!(
            Job::derive_group_id("acme", "v1", Target::Emulator),
            "acme_v1_emulator"
        );
    }

    #[test]
    fn test_generated_job_id_shape() {
        let id = Job::generate_job_id();
        let mut parts = id.splitn(3, '_');
        assert_eq!(parts.next(), Some("job"));
        assert!(parts.next().unwrap().parse::<i64>().is_ok());
        let suffix = parts.next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_from_request_defaults() {
        let req = SubmitRequest::new("acme", "v1", "login.spec", Target::Device);
        let job = Job::from_request(req, &defaults());

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, JobPriority::Medium);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.group_id, "acme_v1_device");
        assert!(job.job_id.starts_with("job_"));
    }

    #[test]
    fn test_from_request_state_import() {
        let mut req = SubmitRequest::new("acme", "v1", "login.spec", Target::Emulator)
            .with_job_id("job_import_1");
        req.status = Some(JobStatus::Failed);
        req.progress = Some(40);
        req.retry_count = Some(2);
        req.device_id = Some("emulator-3".to_string());

        let job = Job::from_request(req, &defaults());
        assert_eq!(job.job_id, "job_import_1");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 40);
        assert_eq!(job.retry_count, 2);
        assert_eq!(job.device_id.as_deref(), Some("emulator-3"));
    }

    #[test]
    fn test_lifecycle_marks() {
        let mut job = Job::new(
            "job_1".to_string(),
            "acme".to_string(),
            "v1".to_string(),
            "a.spec".to_string(),
            Target::Emulator,
            JobPriority::High,
            3,
        );

        job.mark_scheduled("agent-1", "emulator-1");
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.agent_id.as_deref(), Some("agent-1"));

        job.mark_running();
        let first_start = job.started_at;
        assert!(first_start.is_some());

        // a second running entry must not move started_at
        job.mark_running();
        assert_eq!(job.started_at, first_start);

        job.mark_completed("passed in 1200 ms".to_string());
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
    }

    #[test]
    fn test_reset_for_retry() {
        let mut job = Job::new(
            "job_1".to_string(),
            "acme".to_string(),
            "v1".to_string(),
            "a.spec".to_string(),
            Target::Emulator,
            JobPriority::Medium,
            3,
        );
        job.mark_scheduled("agent-1", "emulator-1");
        job.mark_running();
        job.mark_failed("assertion failed".to_string());

        job.reset_for_retry();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.error.is_none());
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.device_id.is_none());
        assert!(job.agent_id.is_none());
    }

    #[test]
    fn test_reset_after_restart() {
        let mut job = Job::new(
            "job_1".to_string(),
            "acme".to_string(),
            "v1".to_string(),
            "a.spec".to_string(),
            Target::Emulator,
            JobPriority::Medium,
            3,
        );
        job.mark_scheduled("agent-1", "emulator-1");
        job.mark_running();

        job.reset_after_restart();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.error.as_deref(), Some(Job::RESTART_RESET));
        assert!(job.agent_id.is_none());
        assert!(job.device_id.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_request_validation() {
        let req = SubmitRequest::new("acme", "v1", "a.spec", Target::Emulator);
        assert!(req.validate().is_ok());

        let req = SubmitRequest::new("", "v1", "a.spec", Target::Emulator);
        assert!(req.validate().is_err());

        let req = SubmitRequest::new("a".repeat(101), "v1", "a.spec", Target::Emulator);
        assert!(req.validate().is_err());

        let req = SubmitRequest::new("acme", "v1", "", Target::Emulator);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_wire_form_round_trip() {
        let req = SubmitRequest::new("acme", "v1", "a.spec", Target::Browserstack)
            .with_priority(JobPriority::High);
        let job = Job::from_request(req, &defaults());

        let raw = serde_json::to_string(&job).unwrap();
        assert!(raw.contains("\"target\":\"browserstack\""));
        assert!(raw.contains("\"priority\":\"high\""));
        assert!(raw.contains("\"status\":\"queued\""));

        let back: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert_eq!(back.target, job.target);
        assert_eq!(back.timestamp, job.timestamp);
    }
}
