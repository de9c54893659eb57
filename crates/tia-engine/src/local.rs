//! Local child-process test engine.
//!
//! Launches test-target commands directly on the host, up to a configured
//! number at a time. Instrumented runs go through an external wrapper binary
//! that writes a coverage artifact (a JSON array of absolute source paths)
//! next to the run's other artifacts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use tia_core::coverage::TestCoverage;
use tia_core::policy::{ExecutionFailure, IntegrityFailure, TargetOutputCapture, TestFailure};
use tia_core::report::{TestRunResult, TestSequenceResult};
use tia_core::target::{Target, TestTarget};

use crate::engine::{JobObserver, RunSettings, TestEngine};
use crate::job::{InstrumentedTestJob, RunOutcome, TestJob};

/// Configuration for the local engine.
#[derive(Debug, Clone)]
pub struct LocalEngineConfig {
    /// Directory run artifacts (coverage, captured output) are written to.
    pub artifact_dir: PathBuf,

    /// Wrapper binary that runs a test command under coverage
    /// instrumentation and writes its artifact. Instrumented runs without a
    /// wrapper execute the plain command; any artifact the command itself
    /// writes is still picked up.
    pub instrumentation_binary: Option<PathBuf>,

    /// Maximum number of concurrently running test-target processes.
    pub max_concurrency: usize,
}

pub struct LocalTestEngine {
    config: LocalEngineConfig,
}

impl LocalTestEngine {
    pub fn new(config: LocalEngineConfig) -> Self {
        Self { config }
    }

    /// Where the coverage artifact for `target_name` is expected.
    pub fn coverage_artifact_path(&self, target_name: &str) -> PathBuf {
        self.config
            .artifact_dir
            .join(format!("{target_name}.coverage.json"))
    }

    fn job_spec(
        &self,
        target: &TestTarget,
        settings: &RunSettings,
        instrumented: bool,
        deadline: Option<Instant>,
    ) -> JobSpec {
        let target_timeout = target
            .launch
            .timeout_hint_ms
            .map(Duration::from_millis)
            .or(settings.target_timeout);
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let timeout = match (target_timeout, remaining) {
            (Some(per_target), Some(remaining)) => Some(per_target.min(remaining)),
            (per_target, remaining) => per_target.or(remaining),
        };

        let artifact = instrumented.then(|| self.coverage_artifact_path(target.name()));
        if let Some(path) = &artifact {
            // A stale artifact would masquerade as fresh coverage.
            let _ = std::fs::remove_file(path);
        }

        let (program, mut args) = match (&self.config.instrumentation_binary, &artifact) {
            (Some(wrapper), Some(path)) => {
                let mut args = vec![
                    "--output".to_string(),
                    path.display().to_string(),
                    "--".to_string(),
                ];
                args.extend(target.launch.command.iter().cloned());
                (wrapper.display().to_string(), args)
            }
            _ => {
                let mut command = target.launch.command.clone();
                let program = if command.is_empty() {
                    String::new()
                } else {
                    command.remove(0)
                };
                (program, command)
            }
        };

        if let Some(filters) = settings.case_filters.get(target.name()) {
            for case in filters {
                args.push(format!("--exclude-test={case}"));
            }
        }

        let output_file = matches!(
            settings.output_capture,
            TargetOutputCapture::File | TargetOutputCapture::StdOutAndFile
        )
        .then(|| {
            self.config
                .artifact_dir
                .join(format!("{}.output.log", target.name()))
        });

        JobSpec {
            target: target.name().to_string(),
            program,
            args,
            command_string: target.launch.command_string(),
            working_dir: target.launch.working_dir.clone(),
            timeout,
            capture: settings.output_capture,
            output_file,
            artifact,
        }
    }

    async fn drive(
        &self,
        targets: &[&TestTarget],
        settings: RunSettings,
        instrumented: bool,
        observer: &mut dyn JobObserver,
    ) -> RunOutcome<InstrumentedTestJob> {
        if targets.is_empty() {
            return RunOutcome::empty();
        }

        if let Err(err) = std::fs::create_dir_all(&self.config.artifact_dir) {
            warn!(
                dir = %self.config.artifact_dir.display(),
                error = %err,
                "could not create artifact directory"
            );
        }

        let deadline = settings.global_timeout.map(|budget| Instant::now() + budget);
        let mut join_set: JoinSet<InstrumentedTestJob> = JoinSet::new();
        let mut pending = targets.iter().copied();
        let mut jobs = Vec::with_capacity(targets.len());
        let mut any_failure = false;
        let mut timed_out = false;
        let mut stop_scheduling = false;

        for _ in 0..self.config.max_concurrency.max(1) {
            if let Some(target) = pending.next() {
                join_set.spawn(execute_job(self.job_spec(
                    target,
                    &settings,
                    instrumented,
                    deadline,
                )));
            }
        }

        while let Some(joined) = join_set.join_next().await {
            let job = match joined {
                Ok(job) => job,
                Err(err) => {
                    warn!(error = %err, "test job task failed");
                    continue;
                }
            };

            observer.on_job_complete(&job.job);

            let global_expired = deadline.is_some_and(|d| Instant::now() >= d);
            if global_expired {
                timed_out = true;
            }

            match job.job.result {
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
                // A per-target timeout; the run as a whole still has budget.
                TestRunResult::Timeout if !global_expired => {
                    any_failure = true;
                }
                _ => {}
            }

            jobs.push(job);

            if !stop_scheduling && !timed_out {
                if let Some(target) = pending.next() {
                    join_set.spawn(execute_job(self.job_spec(
                        target,
                        &settings,
                        instrumented,
                        deadline,
                    )));
                }
            }
        }

        for target in pending {
            jobs.push(InstrumentedTestJob {
                job: TestJob::not_run(target),
                coverage: None,
            });
        }

        let result = if any_failure {
            TestSequenceResult::Failure
        } else if timed_out {
            TestSequenceResult::Timeout
        } else {
            TestSequenceResult::Success
        };

        debug!(
            jobs = jobs.len(),
            ?result,
            instrumented,
            "test engine run complete"
        );

        RunOutcome { result, jobs }
    }
}

#[async_trait]
impl TestEngine for LocalTestEngine {
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

struct JobSpec {
    target: String,
    program: String,
    args: Vec<String>,
    command_string: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
    capture: TargetOutputCapture,
    output_file: Option<PathBuf>,
    artifact: Option<PathBuf>,
}

async fn execute_job(spec: JobSpec) -> InstrumentedTestJob {
    let started_at = Utc::now();
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .kill_on_drop(true);
    match spec.capture {
        TargetOutputCapture::None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        _ => {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
    }

    let result = match command.spawn() {
        Err(err) => {
            warn!(target = %spec.target, error = %err, "failed to execute test target");
            TestRunResult::FailedToExecute
        }
        Ok(child) => {
            let wait = child.wait_with_output();
            let outcome = match spec.timeout {
                // On timeout the wait future is dropped, which kills the child.
                Some(timeout) => tokio::time::timeout(timeout, wait).await.ok(),
                None => Some(wait.await),
            };
            match outcome {
                None => TestRunResult::Timeout,
                Some(Err(err)) => {
                    warn!(target = %spec.target, error = %err, "failed to collect test target output");
                    TestRunResult::FailedToExecute
                }
                Some(Ok(output)) => {
                    handle_captured_output(&spec, &output);
                    if output.status.success() {
                        TestRunResult::AllTestsPass
                    } else {
                        TestRunResult::TestFailures
                    }
                }
            }
        }
    };

    let coverage = spec
        .artifact
        .as_deref()
        .and_then(|path| read_coverage_artifact(&spec.target, path));

    InstrumentedTestJob {
        job: TestJob {
            target: spec.target,
            command: spec.command_string,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            result,
        },
        coverage,
    }
}

fn handle_captured_output(spec: &JobSpec, output: &std::process::Output) {
    match spec.capture {
        TargetOutputCapture::None => {}
        TargetOutputCapture::StdOut => log_output(spec, output),
        TargetOutputCapture::File => write_output_file(spec, output),
        TargetOutputCapture::StdOutAndFile => {
            log_output(spec, output);
            write_output_file(spec, output);
        }
    }
}

fn log_output(spec: &JobSpec, output: &std::process::Output) {
    debug!(
        target = %spec.target,
        stdout = %String::from_utf8_lossy(&output.stdout),
        stderr = %String::from_utf8_lossy(&output.stderr),
        "test target output"
    );
}

fn write_output_file(spec: &JobSpec, output: &std::process::Output) {
    let Some(path) = &spec.output_file else {
        return;
    };
    let mut combined = output.stdout.clone();
    combined.extend_from_slice(&output.stderr);
    if let Err(err) = std::fs::write(path, combined) {
        warn!(target = %spec.target, error = %err, "could not write captured output");
    }
}

fn read_coverage_artifact(target: &str, path: &Path) -> Option<TestCoverage> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<TestCoverage>(&bytes) {
        Ok(coverage) => Some(coverage),
        Err(err) => {
            warn!(target, error = %err, "discarding unreadable coverage artifact");
            None
        }
    }
}
