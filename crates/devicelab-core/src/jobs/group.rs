//! Derived job groups
//!
//! A group is the execution unit of the scheduler: all non-terminal jobs
//! sharing `(org_id, app_version_id, target)` run sequentially on one
//! device to amortize app-installation cost. Groups are derived from a
//! store scan on demand and never persisted.

use crate::jobs::{Job, JobStatus, Target};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate status of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupStatus::Queued => write!(f, "queued"),
            GroupStatus::Running => write!(f, "running"),
            GroupStatus::Completed => write!(f, "completed"),
            GroupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A set of jobs sharing a group ID, sorted for assignment
#[derive(Debug, Clone)]
pub struct JobGroup {
    pub group_id: String,
    pub org_id: String,
    pub app_version_id: String,
    pub target: Target,

    /// Members, priority descending then submission time ascending
    pub jobs: Vec<Job>,
}

impl JobGroup {
    /// Aggregate status: `running` if any member runs, else `failed` if any
    /// failed, else `completed` if all completed, else `queued`.
    pub fn status(&self) -> GroupStatus {
        if self.jobs.iter().any(|j| j.status == JobStatus::Running) {
            GroupStatus::Running
        } else if self.jobs.iter().any(|j| j.status == JobStatus::Failed) {
            GroupStatus::Failed
        } else if !self.jobs.is_empty()
            && self.jobs.iter().all(|j| j.status == JobStatus::Completed)
        {
            GroupStatus::Completed
        } else {
            GroupStatus::Queued
        }
    }

    /// Read-API summary of this group
    pub fn summary(&self) -> GroupSummary {
        let oldest_job = self.jobs.iter().map(|j| j.timestamp).min();
        let newest_job = self.jobs.iter().map(|j| j.timestamp).max();
        GroupSummary {
            group_id: self.group_id.clone(),
            org_id: self.org_id.clone(),
            app_version_id: self.app_version_id.clone(),
            target: self.target,
            job_count: self.jobs.len(),
            status: self.status(),
            oldest_job,
            newest_job,
        }
    }
}

/// Group summary emitted by the read API
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub org_id: String,
    pub app_version_id: String,
    pub target: Target,
    pub job_count: usize,
    pub status: GroupStatus,
    pub oldest_job: Option<DateTime<Utc>>,
    pub newest_job: Option<DateTime<Utc>>,
}

/// Bucket non-terminal jobs by group ID.
///
/// Members are ordered priority descending then timestamp ascending (the
/// in-group execution order); groups come out in group-ID order so ticks
/// are reproducible.
pub fn collect_groups(jobs: Vec<Job>) -> Vec<JobGroup> {
    let mut buckets: BTreeMap<String, Vec<Job>> = BTreeMap::new();
    for job in jobs {
        if job.is_terminal() {
            continue;
        }
        buckets.entry(job.group_id.clone()).or_default().push(job);
    }

    buckets
        .into_iter()
        .map(|(group_id, mut members)| {
            members.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.timestamp.cmp(&b.timestamp))
            });
            let first = &members[0];
            JobGroup {
                group_id,
                org_id: first.org_id.clone(),
                app_version_id: first.app_version_id.clone(),
                target: first.target,
                jobs: members,
            }
        })
        .collect()
}
