//! Test execution collaborator
//!
//! The scheduler drives tests through an injected `TestExecutor`; the core
//! never talks to a device directly. Executors must not touch the job
//! store: the scheduler owns every state transition.

use crate::jobs::Job;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of one test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Pass => write!(f, "pass"),
            TestOutcome::Fail => write!(f, "fail"),
        }
    }
}

/// Outcome plus the artifact recorded on the job
#[derive(Debug, Clone)]
pub struct TestRun {
    pub outcome: TestOutcome,

    /// Human-readable artifact; becomes `result` on pass, `error` on fail
    pub detail: String,

    pub duration: Duration,
}

/// Runs one job's test on the device it was locked to.
///
/// May block for the test duration. An `Err` is recorded as a failed run
/// with the error text as the job's `error`.
#[async_trait::async_trait]
pub trait TestExecutor: Send + Sync {
    async fn run(&self, job: &Job) -> Result<TestRun>;
}

/// Reference executor for stand-alone mode and tests: sleeps for a uniform
/// random duration and passes with a configurable probability.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    pass_rate: f64,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self {
            pass_rate: 0.9,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl SimulatedExecutor {
    /// Create with explicit pass rate and latency bounds
    pub fn new(pass_rate: f64, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            pass_rate: pass_rate.clamp(0.0, 1.0),
            min_delay,
            max_delay,
        }
    }

    /// Zero-latency variant for deterministic tests
    pub fn instant(pass_rate: f64) -> Self {
        Self::new(pass_rate, Duration::ZERO, Duration::ZERO)
    }
}

#[async_trait::async_trait]
impl TestExecutor for SimulatedExecutor {
    async fn run(&self, job: &Job) -> Result<TestRun> {
        use rand::Rng;

        // draw before the await so the rng never crosses it
        let (duration, passed) = {
            let mut rng = rand::thread_rng();
            let duration = if self.max_delay > self.min_delay {
                rng.gen_range(self.min_delay..=self.max_delay)
            } else {
                self.min_delay
            };
            (duration, rng.gen_bool(self.pass_rate))
        };

        tokio::time::sleep(duration).await;

        let millis = duration.as_millis();
        let run = if passed {
            TestRun {
                outcome: TestOutcome::Pass,
                detail: format!("{} passed on {} in {} ms", job.test_path, job.target, millis),
                duration,
            }
        } else {
            TestRun {
                outcome: TestOutcome::Fail,
                detail: format!(
                    "{} failed on {} after {} ms: simulated assertion failure",
                    job.test_path, job.target, millis
                ),
                duration,
            }
        };
        Ok(run)
    }
}
