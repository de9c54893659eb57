//! End-to-end sequence tests against the scripted engine.
//!
//! Time is paused, so scripted job durations advance the clock exactly and
//! timeout threading can be asserted to the millisecond.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tia_core::change_list::ChangeList;
use tia_core::coverage::SourceCoveringTestsList;
use tia_core::error::TargetError;
use tia_core::policy::{CoverageMapUpdate, TestPrioritization};
use tia_core::report::{TestRunResult, TestSequenceResult};
use tia_core::serializer;
use tia_core::target::{
    LaunchSpec, ProductionTarget, SuiteType, Target, TargetDescriptor, TestTarget,
};
use tia_core::target_list::{BuildTargetList, TargetList};
use tia_engine::fakes::{ScriptedOutcome, ScriptedTestEngine};
use tia_runtime::{
    persist, Runtime, RuntimeConfig, RuntimeOptions, SequenceCallbacks, SequenceSettings,
    WorkspaceConfig,
};

const REPO_ROOT: &str = "/repo";

fn production(name: &str, sources: &[&str]) -> ProductionTarget {
    ProductionTarget::new(TargetDescriptor {
        name: name.to_string(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
    })
}

fn test_target(name: &str) -> TestTarget {
    TestTarget {
        descriptor: TargetDescriptor {
            name: name.to_string(),
            sources: vec![format!("tests/{}.cpp", name.to_lowercase())],
        },
        suite: SuiteType::Main,
        launch: LaunchSpec {
            command: vec![format!("bin/{name}")],
            working_dir: PathBuf::from("."),
            timeout_hint_ms: None,
        },
    }
}

fn build_targets() -> BuildTargetList {
    BuildTargetList::new(
        TargetList::new(vec![production("Core", &["a.cpp", "b.cpp", "c.cpp"])])
            .expect("production list"),
        TargetList::new(vec![test_target("T1"), test_target("T2"), test_target("T3")])
            .expect("test list"),
    )
}

fn config(workspace: &Path) -> RuntimeConfig {
    RuntimeConfig {
        repo_root: PathBuf::from(REPO_ROOT),
        workspace: WorkspaceConfig {
            active_root: workspace.join("active"),
            coverage_file_name: "spartia.json".to_string(),
            artifact_dir: workspace.join("artifacts"),
        },
        instrumentation_binary: None,
        excluded_regular_test_targets: Vec::new(),
        excluded_instrumented_test_targets: Vec::new(),
    }
}

fn coverage_file_path(workspace: &Path) -> PathBuf {
    workspace.join("active").join("main").join("spartia.json")
}

fn runtime(
    workspace: &Path,
    engine: Arc<ScriptedTestEngine>,
    options: RuntimeOptions,
) -> Runtime {
    Runtime::new(config(workspace), build_targets(), engine, options).expect("construct runtime")
}

fn coverage(entries: &[(&str, &[&str])]) -> SourceCoveringTestsList {
    let mut list = SourceCoveringTestsList::new();
    for (path, tests) in entries {
        for test in *tests {
            list.insert(*path, *test);
        }
    }
    list
}

/// The seeded map from the fresh-seed scenario: T1 covers a, T2 covers b and
/// c, T3 covers nothing.
fn seed_file(workspace: &Path) {
    persist::store_coverage_file(
        &coverage_file_path(workspace),
        &coverage(&[("a.cpp", &["T1"]), ("b.cpp", &["T2"]), ("c.cpp", &["T2"])]),
    )
    .expect("seed coverage file");
}

fn updated(paths: &[&str]) -> ChangeList {
    ChangeList {
        updated: paths.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn drafted_names(runtime: &Runtime) -> Vec<String> {
    runtime
        .dependency_map()
        .not_covering_tests()
        .iter()
        .map(|t| t.name().to_string())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_seed_builds_and_persists_map() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::pass_covering(100, &["/repo/a.cpp"]))
            .script(
                "T2",
                ScriptedOutcome::pass_covering(100, &["/repo/b.cpp", "/repo/c.cpp"]),
            )
            .script("T3", ScriptedOutcome::pass(100)),
    );
    let mut runtime = runtime(workspace.path(), engine.clone(), RuntimeOptions::default());
    assert!(!runtime.has_impact_analysis_data());

    let report = runtime
        .seeded_sequence(SequenceSettings::default(), SequenceCallbacks::default())
        .await
        .expect("seeded sequence");

    assert_eq!(report.result(), TestSequenceResult::Success);
    assert_eq!(
        report.selected.included,
        vec!["T1".to_string(), "T2".to_string(), "T3".to_string()]
    );
    assert!(runtime.has_impact_analysis_data());

    let expected = coverage(&[("a.cpp", &["T1"]), ("b.cpp", &["T2"]), ("c.cpp", &["T2"])]);
    assert_eq!(runtime.dependency_map().export_source_coverage(), expected);
    assert_eq!(drafted_names(&runtime), vec!["T3".to_string()]);

    let persisted =
        serializer::deserialize(&std::fs::read(runtime.coverage_file()).expect("read file"))
            .expect("decode file");
    assert_eq!(persisted, expected);
}

#[tokio::test(start_paused = true)]
async fn test_impact_analysis_with_map_update() {
    let workspace = tempfile::tempdir().unwrap();
    seed_file(workspace.path());

    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script(
                "T1",
                ScriptedOutcome::pass_covering(100, &["/repo/a.cpp", "/repo/b.cpp"]),
            )
            .script("T3", ScriptedOutcome::pass(100)),
    );
    let mut runtime = runtime(workspace.path(), engine.clone(), RuntimeOptions::default());
    assert!(runtime.has_impact_analysis_data());

    let report = runtime
        .impact_analysis_sequence(
            &updated(&["a.cpp"]),
            TestPrioritization::None,
            CoverageMapUpdate::Update,
            SequenceSettings::default(),
            SequenceCallbacks::default(),
        )
        .await
        .expect("impact sequence");

    assert_eq!(report.selected.included, vec!["T1".to_string()]);
    assert_eq!(report.discarded, vec!["T2".to_string()]);
    assert_eq!(report.drafted, vec!["T3".to_string()]);
    assert_eq!(report.result(), TestSequenceResult::Success);

    // T1 and T3 ran instrumented; T2 was never run.
    let runs = engine.recorded_runs();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.instrumented));
    assert_eq!(runs[0].targets, vec!["T1".to_string()]);
    assert_eq!(runs[1].targets, vec!["T3".to_string()]);

    let expected = coverage(&[
        ("a.cpp", &["T1"]),
        ("b.cpp", &["T1", "T2"]),
        ("c.cpp", &["T2"]),
    ]);
    assert_eq!(runtime.dependency_map().export_source_coverage(), expected);

    let persisted = serializer::deserialize(
        &std::fs::read(coverage_file_path(workspace.path())).expect("read file"),
    )
    .expect("decode file");
    assert_eq!(persisted, expected);
}

#[tokio::test(start_paused = true)]
async fn test_failure_discard_policy_drops_new_and_prior_coverage() {
    let workspace = tempfile::tempdir().unwrap();
    seed_file(workspace.path());

    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::fail_covering(100, &["/repo/a.cpp"]))
            .script("T3", ScriptedOutcome::pass(100)),
    );
    let mut runtime = runtime(workspace.path(), engine, RuntimeOptions::default());

    let report = runtime
        .impact_analysis_sequence(
            &updated(&["a.cpp"]),
            TestPrioritization::None,
            CoverageMapUpdate::Update,
            SequenceSettings::default(),
            SequenceCallbacks::default(),
        )
        .await
        .expect("impact sequence");

    assert_eq!(report.result(), TestSequenceResult::Failure);
    assert_eq!(report.selected_run.count(TestRunResult::TestFailures), 1);

    // T1's prior coverage is pruned, its fresh coverage is discarded, and
    // T2's coverage survives untouched.
    let expected = coverage(&[("b.cpp", &["T2"]), ("c.cpp", &["T2"])]);
    assert_eq!(runtime.dependency_map().export_source_coverage(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_repo_sources_are_dropped() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script(
                "T1",
                ScriptedOutcome::pass_covering(100, &["/repo/a.cpp", "/opt/sdk/x.h"]),
            )
            .script("T2", ScriptedOutcome::pass_covering(100, &["/repo/b.cpp"]))
            .script("T3", ScriptedOutcome::pass(100)),
    );
    let mut runtime = runtime(workspace.path(), engine, RuntimeOptions::default());

    runtime
        .seeded_sequence(SequenceSettings::default(), SequenceCallbacks::default())
        .await
        .expect("seeded sequence");

    let exported = runtime.dependency_map().export_source_coverage();
    assert!(exported.get("a.cpp").expect("entry").contains("T1"));
    assert!(exported.get("/opt/sdk/x.h").is_none());
    assert!(exported.get("x.h").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_global_timeout_budget_threads_into_drafted_phase() {
    let workspace = tempfile::tempdir().unwrap();
    seed_file(workspace.path());

    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::pass_covering(900, &["/repo/a.cpp"]))
            .script("T3", ScriptedOutcome::pass(500)),
    );
    let mut runtime = runtime(workspace.path(), engine.clone(), RuntimeOptions::default());

    let settings = SequenceSettings {
        target_timeout: None,
        global_timeout: Some(Duration::from_millis(1_000)),
    };
    let report = runtime
        .impact_analysis_sequence(
            &updated(&["a.cpp"]),
            TestPrioritization::None,
            CoverageMapUpdate::Update,
            settings,
            SequenceCallbacks::default(),
        )
        .await
        .expect("impact sequence");

    // The selected phase data is complete.
    assert_eq!(report.selected_run.result, TestSequenceResult::Success);
    assert_eq!(report.selected_run.duration_ms, 900);
    assert_eq!(report.selected_run.count(TestRunResult::AllTestsPass), 1);

    // The drafted phase received exactly the remaining 100ms and timed out.
    let runs = engine.recorded_runs();
    assert_eq!(runs[1].global_timeout, Some(Duration::from_millis(100)));
    assert_eq!(report.drafted_run.result, TestSequenceResult::Timeout);
    assert_eq!(report.drafted_run.duration_ms, 100);

    assert_eq!(report.result(), TestSequenceResult::Timeout);
}

#[test]
fn test_duplicate_target_names_fail_construction() {
    let result = TargetList::new(vec![test_target("T1"), test_target("T1")]);
    match result {
        Err(TargetError::DuplicateTarget { name }) => assert_eq!(name, "T1"),
        other => panic!("expected duplicate target error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_callback_counter_spans_phases() {
    let workspace = tempfile::tempdir().unwrap();
    seed_file(workspace.path());

    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::pass_covering(100, &["/repo/a.cpp"]))
            .script("T3", ScriptedOutcome::pass(100)),
    );
    let mut runtime = runtime(workspace.path(), engine, RuntimeOptions::default());

    let mut job_events: Vec<(String, usize, usize)> = Vec::new();
    let mut start_info = None;
    let mut end_reports = 0usize;
    {
        let callbacks = SequenceCallbacks {
            on_start: Some(Box::new(|info| {
                start_info = Some((info.selected.clone(), info.drafted.clone()));
            })),
            on_complete: Some(Box::new(|_report| end_reports += 1)),
            on_job_complete: Some(Box::new(|job, completed, total| {
                job_events.push((job.target.clone(), completed, total));
            })),
        };

        runtime
            .impact_analysis_sequence(
                &updated(&["a.cpp"]),
                TestPrioritization::None,
                CoverageMapUpdate::Update,
                SequenceSettings::default(),
                callbacks,
            )
            .await
            .expect("impact sequence");
    }

    // One monotonically growing counter across both phases, total known up
    // front.
    assert_eq!(
        job_events,
        vec![("T1".to_string(), 1, 2), ("T3".to_string(), 2, 2)]
    );
    let (selected, drafted) = start_info.expect("start callback fired");
    assert_eq!(selected.included, vec!["T1".to_string()]);
    assert_eq!(drafted, vec!["T3".to_string()]);
    assert_eq!(end_reports, 1);
}

#[tokio::test(start_paused = true)]
async fn test_safe_impact_runs_discarded_uninstrumented() {
    let workspace = tempfile::tempdir().unwrap();
    seed_file(workspace.path());

    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::pass_covering(100, &["/repo/a.cpp"]))
            .script("T2", ScriptedOutcome::pass(100))
            .script("T3", ScriptedOutcome::pass(100)),
    );
    let mut runtime = runtime(workspace.path(), engine.clone(), RuntimeOptions::default());

    let report = runtime
        .safe_impact_analysis_sequence(
            &updated(&["a.cpp"]),
            TestPrioritization::None,
            SequenceSettings::default(),
            SequenceCallbacks::default(),
        )
        .await
        .expect("safe impact sequence");

    assert_eq!(report.selected.included, vec!["T1".to_string()]);
    assert_eq!(report.discarded.included, vec!["T2".to_string()]);
    assert_eq!(report.drafted, vec!["T3".to_string()]);

    let runs = engine.recorded_runs();
    assert_eq!(runs.len(), 3);
    assert!(runs[0].instrumented, "selected phase is instrumented");
    assert!(!runs[1].instrumented, "discarded phase is uninstrumented");
    assert!(runs[2].instrumented, "drafted phase is instrumented");
    assert_eq!(runs[1].targets, vec!["T2".to_string()]);

    // Only the selected and drafted phases contribute to the map: T2's
    // prior coverage is untouched.
    let exported = runtime.dependency_map().export_source_coverage();
    assert!(exported.get("b.cpp").expect("entry").contains("T2"));
    assert!(exported.get("a.cpp").expect("entry").contains("T1"));
}

#[tokio::test(start_paused = true)]
async fn test_regular_sequence_honors_exclusions_and_leaves_map_alone() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::pass(50))
            .script("T3", ScriptedOutcome::pass(50)),
    );
    let options = RuntimeOptions {
        tests_to_exclude: vec![tia_core::exclude::ExcludedTarget::whole("T2")],
        ..Default::default()
    };
    let mut runtime = runtime(workspace.path(), engine.clone(), options);

    let report = runtime
        .regular_sequence(SequenceSettings::default(), SequenceCallbacks::default())
        .await;

    assert_eq!(
        report.selected.included,
        vec!["T1".to_string(), "T3".to_string()]
    );
    assert_eq!(report.selected.excluded, vec!["T2".to_string()]);
    assert_eq!(report.result(), TestSequenceResult::Success);

    let runs = engine.recorded_runs();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].instrumented);

    // No map update and no persisted file for a regular sequence.
    assert!(!runtime.has_impact_analysis_data());
    assert!(!coverage_file_path(workspace.path()).exists());
}

#[tokio::test(start_paused = true)]
async fn test_partial_exclusion_filters_reach_the_engine() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::pass(10))
            .script("T2", ScriptedOutcome::pass(10))
            .script("T3", ScriptedOutcome::pass(10)),
    );
    let options = RuntimeOptions {
        tests_to_exclude: vec![tia_core::exclude::ExcludedTarget {
            name: "T2".to_string(),
            excluded_test_cases: vec!["Flaky.*".to_string()],
        }],
        ..Default::default()
    };
    let mut runtime = runtime(workspace.path(), engine.clone(), options);

    let report = runtime
        .regular_sequence(SequenceSettings::default(), SequenceCallbacks::default())
        .await;

    // Partially excluded targets still run; only their case filters ride
    // along to the launcher.
    assert_eq!(
        report.selected.included,
        vec!["T1".to_string(), "T2".to_string(), "T3".to_string()]
    );
    assert!(report.selected.excluded.is_empty());

    let runs = engine.recorded_runs();
    assert_eq!(
        runs[0].case_filters.get("T2"),
        Some(&vec!["Flaky.*".to_string()])
    );
    assert!(runs[0].case_filters.get("T1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_seeded_sequence_removes_stale_file_when_no_data() {
    let workspace = tempfile::tempdir().unwrap();
    seed_file(workspace.path());

    // Every target crashes without an artifact: nothing to ingest.
    let engine = Arc::new(
        ScriptedTestEngine::new()
            .script("T1", ScriptedOutcome::fail_covering(10, &[]).without_artifact())
            .script("T2", ScriptedOutcome::fail_covering(10, &[]).without_artifact())
            .script("T3", ScriptedOutcome::fail_covering(10, &[]).without_artifact()),
    );
    let mut runtime = runtime(
        workspace.path(),
        engine,
        RuntimeOptions {
            failed_test_coverage: tia_core::policy::FailedTestCoverage::Keep,
            ..Default::default()
        },
    );

    let report = runtime
        .seeded_sequence(SequenceSettings::default(), SequenceCallbacks::default())
        .await
        .expect("seeded sequence");

    assert_eq!(report.result(), TestSequenceResult::Failure);
    // Reseeding always drops the previous file; with no fresh data the map
    // ends up empty and nothing is re-persisted.
    assert!(!coverage_file_path(workspace.path()).exists());
    assert!(!runtime.dependency_map().has_source_coverage());
    assert_eq!(drafted_names(&runtime).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_persisted_file_starts_with_empty_map() {
    let workspace = tempfile::tempdir().unwrap();
    let path = coverage_file_path(workspace.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"{ definitely not the right shape").unwrap();

    let engine = Arc::new(ScriptedTestEngine::new());
    let runtime = runtime(workspace.path(), engine, RuntimeOptions::default());

    assert!(!runtime.has_impact_analysis_data());
    assert_eq!(drafted_names(&runtime).len(), 3);
}
