//! Coverage ingestion: consolidating per-job artifacts into the map.

use std::path::Path;

use tracing::{error, warn};

use tia_core::coverage::SourceCoveringTestsList;
use tia_core::dependency_map::DynamicDependencyMap;
use tia_core::error::RuntimeError;
use tia_core::policy::{FailedTestCoverage, IntegrityFailure};
use tia_core::report::TestRunResult;
use tia_engine::job::InstrumentedTestJob;

use crate::persist;

/// Prunes each job's prior coverage from the map and builds the consolidated
/// covering list from the artifacts.
///
/// Per job, in job order: the target's existing coverage is removed
/// regardless of outcome; coverage from failing runs is dropped under
/// [`FailedTestCoverage::Discard`]; a clean pass with no artifact is a
/// contract violation; a failing run with no artifact is treated as a crash
/// and skipped; sources outside the repo root are warned about and skipped.
pub fn consolidate_coverage(
    map: &mut DynamicDependencyMap,
    jobs: &[InstrumentedTestJob],
    policy: FailedTestCoverage,
    repo_root: &Path,
) -> Result<SourceCoveringTestsList, RuntimeError> {
    let mut list = SourceCoveringTestsList::new();

    for job in jobs {
        // Prune first so no source remnants from a previous revision of the
        // target survive this run.
        map.remove_test_target_coverage(&job.job.target);

        let result = job.job.result;

        if policy == FailedTestCoverage::Discard && result == TestRunResult::TestFailures {
            continue;
        }
        if result != TestRunResult::AllTestsPass && result != TestRunResult::TestFailures {
            continue;
        }

        let Some(coverage) = &job.coverage else {
            if result == TestRunResult::AllTestsPass {
                return Err(RuntimeError::MissingCoverage {
                    target: job.job.target.clone(),
                    command: job.job.command.clone(),
                });
            }
            // Failing run with no artifact: the target aborted before the
            // artifact was written. The failure report covers it.
            continue;
        };

        for source in &coverage.sources {
            match source.strip_prefix(repo_root) {
                Ok(relative) => {
                    let relative = relative.to_string_lossy().replace('\\', "/");
                    list.insert(relative, job.job.target.clone());
                }
                Err(_) => {
                    warn!(
                        source = %source.display(),
                        "ignoring covered source outside the repo root"
                    );
                }
            }
        }
    }

    Ok(list)
}

/// Consolidates the jobs into the map and persists the result.
///
/// Returns `Ok(Some(true))` after a successful persist, `Ok(None)` when the
/// consolidation produced no data (the prior map and file are kept). Errors
/// propagate only under [`IntegrityFailure::Abort`]; otherwise they are
/// logged and the update is dropped.
pub fn update_and_persist(
    map: &mut DynamicDependencyMap,
    jobs: &[InstrumentedTestJob],
    policy: FailedTestCoverage,
    integrity_failure: IntegrityFailure,
    repo_root: &Path,
    coverage_file: &Path,
) -> Result<Option<bool>, RuntimeError> {
    let attempt: Result<Option<bool>, RuntimeError> = (|| {
        let list = consolidate_coverage(map, jobs, policy, repo_root)?;
        if list.is_empty() {
            return Ok(None);
        }
        map.replace_source_coverage(&list)
            .map_err(RuntimeError::from)?;
        persist::store_coverage_file(coverage_file, &map.export_source_coverage())?;
        Ok(Some(true))
    })();

    match attempt {
        Ok(outcome) => Ok(outcome),
        Err(err) if integrity_failure == IntegrityFailure::Abort => Err(err),
        Err(err) => {
            error!(error = %err, "coverage ingestion failed, keeping prior map");
            Ok(None)
        }
    }
}
