//! In-memory scripted test engine (testing only).
//!
//! Satisfies the [`TestEngine`](crate::engine::TestEngine) contract without
//! launching processes. Job durations are simulated with `tokio::time`
//! sleeps, so tests running with a paused clock observe exact timings.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tia_core::coverage::TestCoverage;
use tia_core::policy::{ExecutionFailure, IntegrityFailure, TestFailure};
use tia_core::report::{TestRunResult, TestSequenceResult};
use tia_core::target::{Target, TestTarget};

use crate::engine::{JobObserver, RunSettings, TestEngine};
use crate::job::{InstrumentedTestJob, RunOutcome, TestJob};

/// Scripted outcome for one test target.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedOutcome {
    pub result: TestRunResult,
    pub duration_ms: u64,
    /// Coverage artifact an instrumented run yields; `None` simulates a run
    /// that produced no artifact.
    pub coverage: Option<Vec<PathBuf>>,
}

impl ScriptedOutcome {
    /// Clean pass with an artifact covering `sources`.
    pub fn pass_covering(duration_ms: u64, sources: &[&str]) -> Self {
        Self {
            result: TestRunResult::AllTestsPass,
            duration_ms,
            coverage: Some(sources.iter().map(PathBuf::from).collect()),
        }
    }

    /// Clean pass whose artifact lists no sources.
    pub fn pass(duration_ms: u64) -> Self {
        Self::pass_covering(duration_ms, &[])
    }

    /// Failing tests with an artifact covering `sources`.
    pub fn fail_covering(duration_ms: u64, sources: &[&str]) -> Self {
        Self {
            result: TestRunResult::TestFailures,
            duration_ms,
            coverage: Some(sources.iter().map(PathBuf::from).collect()),
        }
    }

    /// Drops the artifact, simulating a crash before it was written.
    pub fn without_artifact(mut self) -> Self {
        self.coverage = None;
        self
    }
}

/// One engine invocation as the fake observed it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRun {
    pub instrumented: bool,
    pub targets: Vec<String>,
    pub global_timeout: Option<Duration>,
    pub case_filters: BTreeMap<String, Vec<String>>,
}

/// Scripted in-memory test engine.
#[derive(Debug, Default)]
pub struct ScriptedTestEngine {
    outcomes: HashMap<String, ScriptedOutcome>,
    runs: Mutex<Vec<RecordedRun>>,
}

impl ScriptedTestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome for `target`.
    pub fn script(mut self, target: &str, outcome: ScriptedOutcome) -> Self {
        self.outcomes.insert(target.to_string(), outcome);
        self
    }

    /// Every run this engine has performed, in order.
    pub fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    async fn drive(
        &self,
        targets: &[&TestTarget],
        settings: RunSettings,
        instrumented: bool,
        observer: &mut dyn JobObserver,
    ) -> RunOutcome<InstrumentedTestJob> {
        self.runs.lock().unwrap().push(RecordedRun {
            instrumented,
            targets: targets.iter().map(|t| t.name().to_string()).collect(),
            global_timeout: settings.global_timeout,
            case_filters: settings.case_filters.clone(),
        });

        let mut jobs = Vec::with_capacity(targets.len());
        let mut consumed = Duration::ZERO;
        let mut any_failure = false;
        let mut timed_out = false;
        let mut stop_scheduling = false;

        for target in targets {
            if timed_out || stop_scheduling {
                jobs.push(InstrumentedTestJob {
                    job: TestJob::not_run(target),
                    coverage: None,
                });
                continue;
            }

            let script = self
                .outcomes
                .get(target.name())
                .unwrap_or_else(|| panic!("no scripted outcome for target '{}'", target.name()))
                .clone();

            let mut duration = Duration::from_millis(script.duration_ms);
            let mut result = script.result;

            if let Some(budget) = settings.global_timeout {
                let remaining = budget.saturating_sub(consumed);
                if remaining.is_zero() {
                    timed_out = true;
                    jobs.push(InstrumentedTestJob {
                        job: TestJob::not_run(target),
                        coverage: None,
                    });
                    continue;
                }
                if duration > remaining {
                    duration = remaining;
                    result = TestRunResult::Timeout;
                    timed_out = true;
                }
            }

            tokio::time::sleep(duration).await;
            consumed += duration;

            let job = TestJob {
                target: target.name().to_string(),
                command: target.launch.command_string(),
                started_at: Utc::now(),
                duration_ms: duration.as_millis() as u64,
                result,
            };
            observer.on_job_complete(&job);

            match result {
                TestRunResult::TestFailures => {
                    any_failure = true;
                    if settings.test_failure == TestFailure::Abort {
                        stop_scheduling = true;
                    }
                }
                TestRunResult::FailedToExecute => {
                    if settings.execution_failure != ExecutionFailure::Ignore {
                        any_failure = true;
                    }
                    if settings.execution_failure == ExecutionFailure::Abort {
                        stop_scheduling = true;
                    }
                }
                TestRunResult::Timeout if !timed_out => {
                    any_failure = true;
                }
                _ => {}
            }

            jobs.push(InstrumentedTestJob {
                coverage: if instrumented {
                    script.coverage.map(|sources| TestCoverage { sources })
                } else {
                    None
                },
                job,
            });
        }

        let result = if any_failure {
            TestSequenceResult::Failure
        } else if timed_out {
            TestSequenceResult::Timeout
        } else {
            TestSequenceResult::Success
        };

        RunOutcome { result, jobs }
    }
}

#[async_trait]
impl TestEngine for ScriptedTestEngine {
    async fn regular_run(
        &self,
        targets: &[&TestTarget],
        settings: RunSettings,
        observer: &mut dyn JobObserver,
    ) -> RunOutcome<TestJob> {
        let outcome = self.drive(targets, settings, false, observer).await;
        RunOutcome {
            result: outcome.result,
            jobs: outcome.jobs.into_iter().map(|job| job.job).collect(),
        }
    }

    async fn instrumented_run(
        &self,
        targets: &[&TestTarget],
        settings: RunSettings,
        _integrity_failure: IntegrityFailure,
        observer: &mut dyn JobObserver,
    ) -> RunOutcome<InstrumentedTestJob> {
        self.drive(targets, settings, true, observer).await
    }
}
