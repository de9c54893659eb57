//! The four test sequence modes.
//!
//! Every sequence shares one skeleton: partition the targets, fire the start
//! callback, run the phases with the global budget threaded between them,
//! optionally ingest coverage, assemble the report, fire the end callback.
//! A single progress counter is shared across the phases so the client sees
//! one monotonically growing `(completed, total)` stream whose total is
//! known up front.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use tia_core::change_list::ChangeList;
use tia_core::error::RuntimeError;
use tia_core::exclude::TestTargetExcludeList;
use tia_core::policy::{CoverageMapUpdate, IntegrityFailure, TestPrioritization};
use tia_core::report::{
    ImpactAnalysisSequenceReport, RegularSequenceReport, SafeImpactAnalysisSequenceReport,
    SeedSequenceReport, SequenceReport, TestJobReport, TestRunReport, TestRunSelection,
    TestSequenceResult,
};
use tia_core::target::{SuiteType, Target, TestTarget};
use tia_engine::engine::{JobObserver, RunSettings};
use tia_engine::job::{AsTestJob, InstrumentedTestJob, RunOutcome, TestJob};

use crate::consolidate;
use crate::runtime::Runtime;

/// Optional timeouts for one sequence invocation. Absence means infinite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceSettings {
    /// Budget per test target.
    pub target_timeout: Option<Duration>,

    /// Budget for the whole sequence; the remainder after each phase is
    /// passed to the next.
    pub global_timeout: Option<Duration>,
}

/// Selection views passed to the start callback.
#[derive(Debug, Clone)]
pub struct SequenceStartInfo {
    pub suite: SuiteType,
    pub selected: TestRunSelection,
    pub discarded: TestRunSelection,
    pub drafted: Vec<String>,
}

/// Client notifications for one sequence. Absent callbacks mean no
/// notification.
#[derive(Default)]
pub struct SequenceCallbacks<'a> {
    pub on_start: Option<Box<dyn FnMut(&SequenceStartInfo) + Send + 'a>>,
    pub on_complete: Option<Box<dyn FnMut(&SequenceReport) + Send + 'a>>,

    /// Invoked once per completed job with the running `(completed, total)`
    /// counter.
    pub on_job_complete: Option<Box<dyn FnMut(&TestJobReport, usize, usize) + Send + 'a>>,
}

/// Phase progression of a sequence; transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SequenceState {
    Idle,
    Starting,
    RunningSelected,
    RunningDiscarded,
    RunningDrafted,
    Ingesting,
    Reporting,
    Done,
}

struct StateTracker {
    state: SequenceState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: SequenceState::Idle,
        }
    }

    fn advance(&mut self, next: SequenceState) {
        debug_assert!(
            next >= self.state,
            "sequence state must advance monotonically"
        );
        debug!(from = ?self.state, to = ?next, "sequence state");
        self.state = next;
    }
}

struct SequenceTimer {
    start: Instant,
}

impl SequenceTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// The shared per-job progress counter.
struct ProgressObserver<'c, 'f> {
    completed: usize,
    total: usize,
    callback: Option<&'c mut (dyn FnMut(&TestJobReport, usize, usize) + Send + 'f)>,
}

impl<'c, 'f> ProgressObserver<'c, 'f> {
    fn new(
        total: usize,
        callback: Option<&'c mut (dyn FnMut(&TestJobReport, usize, usize) + Send + 'f)>,
    ) -> Self {
        Self {
            completed: 0,
            total,
            callback,
        }
    }
}

impl JobObserver for ProgressObserver<'_, '_> {
    fn on_job_complete(&mut self, job: &TestJob) {
        self.completed += 1;
        if let Some(callback) = self.callback.as_mut() {
            callback(&job.to_report(), self.completed, self.total);
        }
    }
}

/// Result and timing of one phase. Regular phases carry their jobs with
/// `coverage: None`.
struct PhaseRunData {
    result: TestSequenceResult,
    jobs: Vec<InstrumentedTestJob>,
    start_offset_ms: u64,
    duration_ms: u64,
}

impl PhaseRunData {
    fn empty() -> Self {
        Self {
            result: TestSequenceResult::Success,
            jobs: Vec::new(),
            start_offset_ms: 0,
            duration_ms: 0,
        }
    }

    fn to_report(&self) -> TestRunReport {
        TestRunReport {
            result: self.result,
            start_offset_ms: self.start_offset_ms,
            duration_ms: self.duration_ms,
            jobs: self.jobs.iter().map(|job| job.test_job().to_report()).collect(),
        }
    }
}

fn to_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Remaining global budget after the phases so far.
fn remaining_budget(global: Option<Duration>, consumed: Duration) -> Option<Duration> {
    global.map(|budget| budget.saturating_sub(consumed))
}

fn names(targets: &[&TestTarget]) -> Vec<String> {
    targets.iter().map(|t| t.name().to_string()).collect()
}

fn selection(included: &[&TestTarget], excluded: &[&TestTarget]) -> TestRunSelection {
    TestRunSelection {
        included: names(included),
        excluded: names(excluded),
    }
}

fn partition_by_exclude_list<'a>(
    exclude_list: &TestTargetExcludeList,
    targets: Vec<&'a TestTarget>,
) -> (Vec<&'a TestTarget>, Vec<&'a TestTarget>) {
    targets
        .into_iter()
        .partition(|target| !exclude_list.is_test_target_fully_excluded(target))
}

impl Runtime {
    fn run_settings(
        &self,
        instrumented: bool,
        targets: &[&TestTarget],
        target_timeout: Option<Duration>,
        global_timeout: Option<Duration>,
    ) -> RunSettings {
        // Partially excluded targets still run; their case filters ride
        // along to the launcher.
        let exclude_list = if instrumented {
            &self.instrumented_exclude_list
        } else {
            &self.regular_exclude_list
        };
        let case_filters = targets
            .iter()
            .filter_map(|target| {
                exclude_list
                    .test_case_filters(target)
                    .map(|filters| (target.name().to_string(), filters.to_vec()))
            })
            .collect();

        RunSettings {
            execution_failure: self.options.execution_failure,
            test_failure: self.options.test_failure,
            output_capture: self.options.target_output_capture,
            target_timeout,
            global_timeout,
            case_filters,
        }
    }

    async fn run_phase(
        &self,
        instrumented: bool,
        targets: &[&TestTarget],
        target_timeout: Option<Duration>,
        global_remaining: Option<Duration>,
        observer: &mut dyn JobObserver,
        timer: &SequenceTimer,
    ) -> PhaseRunData {
        if targets.is_empty() {
            return PhaseRunData::empty();
        }

        let start = timer.elapsed();
        let settings = self.run_settings(instrumented, targets, target_timeout, global_remaining);
        let outcome = if instrumented {
            self.engine
                .instrumented_run(targets, settings, self.options.integrity_failure, observer)
                .await
        } else {
            let outcome = self.engine.regular_run(targets, settings, observer).await;
            RunOutcome {
                result: outcome.result,
                jobs: outcome
                    .jobs
                    .into_iter()
                    .map(|job| InstrumentedTestJob {
                        job,
                        coverage: None,
                    })
                    .collect(),
            }
        };
        let duration = timer.elapsed().saturating_sub(start);

        PhaseRunData {
            result: outcome.result,
            jobs: outcome.jobs,
            start_offset_ms: to_ms(start),
            duration_ms: to_ms(duration),
        }
    }

    /// Selected and discarded test targets for a change list, per the
    /// current map and the prioritization policy.
    fn select_covering_test_targets(
        &self,
        change_list: &ChangeList,
        prioritization: TestPrioritization,
    ) -> Result<(Vec<&TestTarget>, Vec<&TestTarget>), RuntimeError> {
        let resolved = self
            .dependency_map
            .apply_and_resolve_change_list(change_list, self.options.integrity_failure)?;
        let selected = self.selector.select_test_targets(&resolved, prioritization);

        let selected_set: HashSet<&str> = selected.iter().map(|t| t.name()).collect();
        let discarded = self
            .build_targets
            .test_targets()
            .iter()
            .filter(|target| !selected_set.contains(target.name()))
            .collect();

        Ok((selected, discarded))
    }

    /// Runs every non-excluded test target once, uninstrumented. The map is
    /// not consulted and not updated.
    pub async fn regular_sequence(
        &mut self,
        settings: SequenceSettings,
        mut callbacks: SequenceCallbacks<'_>,
    ) -> RegularSequenceReport {
        let timer = SequenceTimer::new();
        let mut state = StateTracker::new();
        state.advance(SequenceState::Starting);
        info!(suite = self.options.suite.as_str(), "starting regular test sequence");

        let build_targets = Arc::clone(&self.build_targets);
        let all: Vec<&TestTarget> = build_targets.test_targets().iter().collect();
        let (included, excluded) = partition_by_exclude_list(&self.regular_exclude_list, all);
        let selected = selection(&included, &excluded);

        if let Some(on_start) = callbacks.on_start.as_mut() {
            on_start(&SequenceStartInfo {
                suite: self.options.suite,
                selected: selected.clone(),
                discarded: TestRunSelection::default(),
                drafted: Vec::new(),
            });
        }

        let mut progress =
            ProgressObserver::new(included.len(), callbacks.on_job_complete.as_deref_mut());

        state.advance(SequenceState::RunningSelected);
        let run = self
            .run_phase(
                false,
                &included,
                settings.target_timeout,
                settings.global_timeout,
                &mut progress,
                &timer,
            )
            .await;

        state.advance(SequenceState::Reporting);
        let report = RegularSequenceReport {
            sequence_id: Uuid::new_v4(),
            suite: self.options.suite,
            max_concurrency: self.max_concurrency,
            target_timeout_ms: settings.target_timeout.map(to_ms),
            global_timeout_ms: settings.global_timeout.map(to_ms),
            policy: self.policy_state(),
            selected,
            run: run.to_report(),
        };
        if let Some(on_complete) = callbacks.on_complete.as_mut() {
            on_complete(&SequenceReport::Regular(report.clone()));
        }
        state.advance(SequenceState::Done);
        report
    }

    /// Runs every non-excluded test target once, instrumented, then reseeds
    /// the map wholesale: prior coverage and the persisted file are dropped
    /// before the fresh coverage is ingested and persisted.
    pub async fn seeded_sequence(
        &mut self,
        settings: SequenceSettings,
        mut callbacks: SequenceCallbacks<'_>,
    ) -> Result<SeedSequenceReport, RuntimeError> {
        let timer = SequenceTimer::new();
        let mut state = StateTracker::new();
        state.advance(SequenceState::Starting);
        info!(suite = self.options.suite.as_str(), "starting seeded test sequence");

        let build_targets = Arc::clone(&self.build_targets);
        let all: Vec<&TestTarget> = build_targets.test_targets().iter().collect();
        let (included, excluded) = partition_by_exclude_list(&self.instrumented_exclude_list, all);
        let selected = selection(&included, &excluded);

        if let Some(on_start) = callbacks.on_start.as_mut() {
            on_start(&SequenceStartInfo {
                suite: self.options.suite,
                selected: selected.clone(),
                discarded: TestRunSelection::default(),
                drafted: Vec::new(),
            });
        }

        let mut progress =
            ProgressObserver::new(included.len(), callbacks.on_job_complete.as_deref_mut());

        state.advance(SequenceState::RunningSelected);
        let run = self
            .run_phase(
                true,
                &included,
                settings.target_timeout,
                settings.global_timeout,
                &mut progress,
                &timer,
            )
            .await;

        state.advance(SequenceState::Ingesting);
        match self.clear_coverage_and_remove_file() {
            Ok(()) => {}
            Err(err) if self.options.integrity_failure == IntegrityFailure::Abort => {
                return Err(err)
            }
            Err(err) => error!(error = %err, "could not remove prior coverage file"),
        }
        let updated = consolidate::update_and_persist(
            &mut self.dependency_map,
            &run.jobs,
            self.options.failed_test_coverage,
            self.options.integrity_failure,
            &self.config.repo_root,
            &self.coverage_file,
        )?;
        if let Some(updated) = updated {
            self.has_impact_analysis_data = updated;
        }

        state.advance(SequenceState::Reporting);
        let report = SeedSequenceReport {
            sequence_id: Uuid::new_v4(),
            suite: self.options.suite,
            max_concurrency: self.max_concurrency,
            target_timeout_ms: settings.target_timeout.map(to_ms),
            global_timeout_ms: settings.global_timeout.map(to_ms),
            policy: self.policy_state(),
            selected,
            run: run.to_report(),
        };
        if let Some(on_complete) = callbacks.on_complete.as_mut() {
            on_complete(&SequenceReport::Seed(report.clone()));
        }
        state.advance(SequenceState::Done);
        Ok(report)
    }

    /// Runs the tests selected for the change list plus the drafted targets
    /// the map does not cover yet. Discarded targets are not run. With
    /// [`CoverageMapUpdate::Update`] both phases run instrumented and their
    /// coverage is ingested and persisted.
    pub async fn impact_analysis_sequence(
        &mut self,
        change_list: &ChangeList,
        prioritization: TestPrioritization,
        map_update: CoverageMapUpdate,
        settings: SequenceSettings,
        mut callbacks: SequenceCallbacks<'_>,
    ) -> Result<ImpactAnalysisSequenceReport, RuntimeError> {
        let timer = SequenceTimer::new();
        let mut state = StateTracker::new();
        state.advance(SequenceState::Starting);
        info!(
            suite = self.options.suite.as_str(),
            created = change_list.created.len(),
            updated = change_list.updated.len(),
            deleted = change_list.deleted.len(),
            "starting impact analysis test sequence"
        );

        // Draft in the test targets with no coverage entries so baseline
        // coverage gets established for them.
        let drafted = self.dependency_map.not_covering_tests();
        let drafted_set: HashSet<&str> = drafted.iter().map(|t| t.name()).collect();

        let (selected_all, discarded_raw) =
            self.select_covering_test_targets(change_list, prioritization)?;
        let discarded: Vec<&TestTarget> = discarded_raw
            .into_iter()
            .filter(|target| !drafted_set.contains(target.name()))
            .collect();

        let (included_selected, excluded_selected) =
            partition_by_exclude_list(&self.instrumented_exclude_list, selected_all);
        let selected_view = selection(&included_selected, &excluded_selected);
        let discarded_names = names(&discarded);
        let drafted_names = names(&drafted);

        if let Some(on_start) = callbacks.on_start.as_mut() {
            on_start(&SequenceStartInfo {
                suite: self.options.suite,
                selected: selected_view.clone(),
                discarded: TestRunSelection {
                    included: discarded_names.clone(),
                    excluded: Vec::new(),
                },
                drafted: drafted_names.clone(),
            });
        }

        let total = included_selected.len() + drafted.len();
        let mut progress =
            ProgressObserver::new(total, callbacks.on_job_complete.as_deref_mut());

        let instrumented = map_update == CoverageMapUpdate::Update;
        let mut consumed = Duration::ZERO;

        state.advance(SequenceState::RunningSelected);
        let selected_run = self
            .run_phase(
                instrumented,
                &included_selected,
                settings.target_timeout,
                settings.global_timeout,
                &mut progress,
                &timer,
            )
            .await;
        consumed += Duration::from_millis(selected_run.duration_ms);

        state.advance(SequenceState::RunningDrafted);
        let drafted_run = self
            .run_phase(
                instrumented,
                &drafted,
                settings.target_timeout,
                remaining_budget(settings.global_timeout, consumed),
                &mut progress,
                &timer,
            )
            .await;

        if instrumented {
            state.advance(SequenceState::Ingesting);
            let ingest_jobs: Vec<InstrumentedTestJob> = selected_run
                .jobs
                .iter()
                .chain(drafted_run.jobs.iter())
                .cloned()
                .collect();
            let updated = consolidate::update_and_persist(
                &mut self.dependency_map,
                &ingest_jobs,
                self.options.failed_test_coverage,
                self.options.integrity_failure,
                &self.config.repo_root,
                &self.coverage_file,
            )?;
            if let Some(updated) = updated {
                self.has_impact_analysis_data = updated;
            }
        }

        state.advance(SequenceState::Reporting);
        let report = ImpactAnalysisSequenceReport {
            sequence_id: Uuid::new_v4(),
            suite: self.options.suite,
            max_concurrency: self.max_concurrency,
            target_timeout_ms: settings.target_timeout.map(to_ms),
            global_timeout_ms: settings.global_timeout.map(to_ms),
            policy: self.impact_policy_state(prioritization, map_update),
            selected: selected_view,
            discarded: discarded_names,
            drafted: drafted_names,
            selected_run: selected_run.to_report(),
            drafted_run: drafted_run.to_report(),
        };
        if let Some(on_complete) = callbacks.on_complete.as_mut() {
            on_complete(&SequenceReport::ImpactAnalysis(report.clone()));
        }
        state.advance(SequenceState::Done);
        Ok(report)
    }

    /// As impact analysis, but the discarded targets also run (uninstrumented)
    /// between the selected and drafted phases, so a regression in a test the
    /// map thought irrelevant is still caught. Only the selected and drafted
    /// phases contribute coverage; the map is always updated.
    pub async fn safe_impact_analysis_sequence(
        &mut self,
        change_list: &ChangeList,
        prioritization: TestPrioritization,
        settings: SequenceSettings,
        mut callbacks: SequenceCallbacks<'_>,
    ) -> Result<SafeImpactAnalysisSequenceReport, RuntimeError> {
        let timer = SequenceTimer::new();
        let mut state = StateTracker::new();
        state.advance(SequenceState::Starting);
        info!(
            suite = self.options.suite.as_str(),
            "starting safe impact analysis test sequence"
        );

        let drafted = self.dependency_map.not_covering_tests();
        let drafted_set: HashSet<&str> = drafted.iter().map(|t| t.name()).collect();

        let (selected_all, discarded_raw) =
            self.select_covering_test_targets(change_list, prioritization)?;
        let discarded_all: Vec<&TestTarget> = discarded_raw
            .into_iter()
            .filter(|target| !drafted_set.contains(target.name()))
            .collect();

        let (included_selected, excluded_selected) =
            partition_by_exclude_list(&self.instrumented_exclude_list, selected_all);
        let (included_discarded, excluded_discarded) =
            partition_by_exclude_list(&self.regular_exclude_list, discarded_all);

        let selected_view = selection(&included_selected, &excluded_selected);
        let discarded_view = selection(&included_discarded, &excluded_discarded);
        let drafted_names = names(&drafted);

        if let Some(on_start) = callbacks.on_start.as_mut() {
            on_start(&SequenceStartInfo {
                suite: self.options.suite,
                selected: selected_view.clone(),
                discarded: discarded_view.clone(),
                drafted: drafted_names.clone(),
            });
        }

        let total = included_selected.len() + included_discarded.len() + drafted.len();
        let mut progress =
            ProgressObserver::new(total, callbacks.on_job_complete.as_deref_mut());

        let mut consumed = Duration::ZERO;

        state.advance(SequenceState::RunningSelected);
        let selected_run = self
            .run_phase(
                true,
                &included_selected,
                settings.target_timeout,
                settings.global_timeout,
                &mut progress,
                &timer,
            )
            .await;
        consumed += Duration::from_millis(selected_run.duration_ms);

        state.advance(SequenceState::RunningDiscarded);
        let discarded_run = self
            .run_phase(
                false,
                &included_discarded,
                settings.target_timeout,
                remaining_budget(settings.global_timeout, consumed),
                &mut progress,
                &timer,
            )
            .await;
        consumed += Duration::from_millis(discarded_run.duration_ms);

        state.advance(SequenceState::RunningDrafted);
        let drafted_run = self
            .run_phase(
                true,
                &drafted,
                settings.target_timeout,
                remaining_budget(settings.global_timeout, consumed),
                &mut progress,
                &timer,
            )
            .await;

        state.advance(SequenceState::Ingesting);
        let ingest_jobs: Vec<InstrumentedTestJob> = selected_run
            .jobs
            .iter()
            .chain(drafted_run.jobs.iter())
            .cloned()
            .collect();
        let updated = consolidate::update_and_persist(
            &mut self.dependency_map,
            &ingest_jobs,
            self.options.failed_test_coverage,
            self.options.integrity_failure,
            &self.config.repo_root,
            &self.coverage_file,
        )?;
        if let Some(updated) = updated {
            self.has_impact_analysis_data = updated;
        }

        state.advance(SequenceState::Reporting);
        let report = SafeImpactAnalysisSequenceReport {
            sequence_id: Uuid::new_v4(),
            suite: self.options.suite,
            max_concurrency: self.max_concurrency,
            target_timeout_ms: settings.target_timeout.map(to_ms),
            global_timeout_ms: settings.global_timeout.map(to_ms),
            policy: self.safe_impact_policy_state(prioritization),
            selected: selected_view,
            discarded: discarded_view,
            drafted: drafted_names,
            selected_run: selected_run.to_report(),
            discarded_run: discarded_run.to_report(),
            drafted_run: drafted_run.to_report(),
        };
        if let Some(on_complete) = callbacks.on_complete.as_mut() {
            on_complete(&SequenceReport::SafeImpactAnalysis(report.clone()));
        }
        state.advance(SequenceState::Done);
        Ok(report)
    }
}
