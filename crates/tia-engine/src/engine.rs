//! The test engine contract consumed by the sequence orchestrator.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use tia_core::policy::{ExecutionFailure, IntegrityFailure, TargetOutputCapture, TestFailure};
use tia_core::target::TestTarget;

use crate::job::{InstrumentedTestJob, RunOutcome, TestJob};

/// Observes job completion. Invoked exactly once per completed job, in
/// completion order, from a single logical thread; never-scheduled (`NotRun`)
/// jobs are not observed.
pub trait JobObserver: Send {
    fn on_job_complete(&mut self, job: &TestJob);
}

/// Observer that discards all notifications.
pub struct NullObserver;

impl JobObserver for NullObserver {
    fn on_job_complete(&mut self, _job: &TestJob) {}
}

/// Settings shared by regular and instrumented runs.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub execution_failure: ExecutionFailure,
    pub test_failure: TestFailure,
    pub output_capture: TargetOutputCapture,

    /// Per-target budget; a target's own timeout hint takes precedence.
    pub target_timeout: Option<Duration>,

    /// Budget for the whole run. When it elapses the engine stops scheduling
    /// new jobs, terminates running ones, and reports `Timeout`.
    pub global_timeout: Option<Duration>,

    /// Test-case exclusion filters per target name, from partial exclusions.
    /// The launcher appends one `--exclude-test=<case>` argument per filter.
    pub case_filters: BTreeMap<String, Vec<String>>,
}

/// A test engine executes batches of test targets.
///
/// Contract: all child processes are terminated before a run returns, and
/// the observer sees each completed job exactly once in completion order.
#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Runs the targets without coverage instrumentation.
    async fn regular_run(
        &self,
        targets: &[&TestTarget],
        settings: RunSettings,
        observer: &mut dyn JobObserver,
    ) -> RunOutcome<TestJob>;

    /// Runs the targets with coverage instrumentation; each completed job
    /// carries its coverage artifact when one was produced.
    async fn instrumented_run(
        &self,
        targets: &[&TestTarget],
        settings: RunSettings,
        integrity_failure: IntegrityFailure,
        observer: &mut dyn JobObserver,
    ) -> RunOutcome<InstrumentedTestJob>;
}
