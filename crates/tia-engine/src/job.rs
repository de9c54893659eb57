//! Test engine job records.

use chrono::{DateTime, Utc};

use tia_core::coverage::TestCoverage;
use tia_core::report::{TestJobReport, TestRunResult, TestSequenceResult};
use tia_core::target::{Target, TestTarget};

/// The result of launching one test target.
#[derive(Debug, Clone, PartialEq)]
pub struct TestJob {
    pub target: String,

    /// Command string that was (or would have been) executed.
    pub command: String,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,

    pub result: TestRunResult,
}

impl TestJob {
    /// A job for a target that was never scheduled.
    pub fn not_run(target: &TestTarget) -> Self {
        Self {
            target: target.name().to_string(),
            command: target.launch.command_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            result: TestRunResult::NotRun,
        }
    }

    pub fn to_report(&self) -> TestJobReport {
        TestJobReport {
            target: self.target.clone(),
            command: self.command.clone(),
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            result: self.result,
        }
    }
}

/// A test job plus the coverage artifact an instrumented run produced, if
/// any.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentedTestJob {
    pub job: TestJob,
    pub coverage: Option<TestCoverage>,
}

/// Access to the underlying job record, shared by regular and instrumented
/// jobs.
pub trait AsTestJob {
    fn test_job(&self) -> &TestJob;
}

impl AsTestJob for TestJob {
    fn test_job(&self) -> &TestJob {
        self
    }
}

impl AsTestJob for InstrumentedTestJob {
    fn test_job(&self) -> &TestJob {
        &self.job
    }
}

/// What an engine run produced: the aggregate phase result plus the jobs in
/// completion order (never-scheduled targets trail as `NotRun`).
#[derive(Debug, Clone)]
pub struct RunOutcome<J> {
    pub result: TestSequenceResult,
    pub jobs: Vec<J>,
}

impl<J> RunOutcome<J> {
    pub fn empty() -> Self {
        Self {
            result: TestSequenceResult::Success,
            jobs: Vec::new(),
        }
    }
}
