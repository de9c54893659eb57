//! Runtime construction and shared state.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use tia_core::dependency_map::DynamicDependencyMap;
use tia_core::error::RuntimeError;
use tia_core::exclude::{ExcludedTarget, TestTargetExcludeList};
use tia_core::policy::{
    CoverageMapUpdate, ExecutionFailure, FailedTestCoverage, ImpactAnalysisPolicyState,
    IntegrityFailure, PolicyState, SafeImpactAnalysisPolicyState, TargetOutputCapture,
    TestFailure, TestPrioritization, TestSharding,
};
use tia_core::selector::TestSelector;
use tia_core::target::SuiteType;
use tia_core::target_list::BuildTargetList;
use tia_engine::TestEngine;

use crate::config::RuntimeConfig;
use crate::persist;

/// Per-runtime options: the suite under test, the sequence policies, and
/// overrides for the persisted data location and concurrency.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub suite: SuiteType,

    /// Explicit location of the persisted coverage map. Defaults to
    /// `<active_root>/<suite>/<coverage_file_name>`.
    pub data_file: Option<PathBuf>,

    /// When non-empty, seeds both the regular and the instrumented exclude
    /// lists in place of the config sections.
    pub tests_to_exclude: Vec<ExcludedTarget>,

    pub execution_failure: ExecutionFailure,
    pub failed_test_coverage: FailedTestCoverage,
    pub test_failure: TestFailure,
    pub integrity_failure: IntegrityFailure,
    pub test_sharding: TestSharding,
    pub target_output_capture: TargetOutputCapture,

    /// Defaults to the host's logical CPU count.
    pub max_concurrency: Option<usize>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            suite: SuiteType::Main,
            data_file: None,
            tests_to_exclude: Vec::new(),
            execution_failure: ExecutionFailure::default(),
            failed_test_coverage: FailedTestCoverage::default(),
            test_failure: TestFailure::default(),
            integrity_failure: IntegrityFailure::default(),
            test_sharding: TestSharding::default(),
            target_output_capture: TargetOutputCapture::default(),
            max_concurrency: None,
        }
    }
}

/// The orchestration engine: owns the build targets, the dynamic dependency
/// map, the selection and exclusion machinery, and drives sequences against
/// a test engine.
pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) options: RuntimeOptions,
    pub(crate) build_targets: Arc<BuildTargetList>,
    pub(crate) dependency_map: DynamicDependencyMap,
    pub(crate) selector: TestSelector,
    pub(crate) regular_exclude_list: TestTargetExcludeList,
    pub(crate) instrumented_exclude_list: TestTargetExcludeList,
    pub(crate) engine: Arc<dyn TestEngine>,
    pub(crate) coverage_file: PathBuf,
    pub(crate) max_concurrency: usize,
    pub(crate) has_impact_analysis_data: bool,
}

impl Runtime {
    /// Constructs the runtime and seeds the dependency map from the
    /// persisted coverage file, if one exists.
    ///
    /// A missing or undecodable file is non-fatal. Persisted data that
    /// references unknown test targets fails construction only under
    /// [`IntegrityFailure::Abort`]; otherwise it is discarded with a
    /// warning.
    pub fn new(
        config: RuntimeConfig,
        build_targets: BuildTargetList,
        engine: Arc<dyn TestEngine>,
        options: RuntimeOptions,
    ) -> Result<Self, RuntimeError> {
        let build_targets = Arc::new(build_targets);

        let (regular_exclusions, instrumented_exclusions) = if options.tests_to_exclude.is_empty()
        {
            (
                config.excluded_regular_test_targets.clone(),
                config.excluded_instrumented_test_targets.clone(),
            )
        } else {
            (
                options.tests_to_exclude.clone(),
                options.tests_to_exclude.clone(),
            )
        };
        let regular_exclude_list =
            TestTargetExcludeList::new(build_targets.test_targets(), &regular_exclusions);
        let instrumented_exclude_list =
            TestTargetExcludeList::new(build_targets.test_targets(), &instrumented_exclusions);

        let coverage_file = options.data_file.clone().unwrap_or_else(|| {
            config
                .workspace
                .active_root
                .join(options.suite.as_str())
                .join(&config.workspace.coverage_file_name)
        });

        let max_concurrency = options.max_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });

        let mut runtime = Self {
            dependency_map: DynamicDependencyMap::new(build_targets.clone()),
            selector: TestSelector::new(build_targets.clone()),
            build_targets,
            regular_exclude_list,
            instrumented_exclude_list,
            engine,
            coverage_file,
            max_concurrency,
            has_impact_analysis_data: false,
            config,
            options,
        };
        runtime.seed_from_persisted()?;
        Ok(runtime)
    }

    fn seed_from_persisted(&mut self) -> Result<(), RuntimeError> {
        let Some(list) = persist::load_coverage_file(&self.coverage_file) else {
            info!(
                suite = self.options.suite.as_str(),
                path = %self.coverage_file.display(),
                "no impact analysis data for suite"
            );
            return Ok(());
        };

        match self.dependency_map.replace_source_coverage(&list) {
            Ok(()) => {
                self.has_impact_analysis_data = true;
                info!(
                    suite = self.options.suite.as_str(),
                    sources = list.len(),
                    "seeded dependency map from persisted coverage"
                );
                Ok(())
            }
            Err(err) if self.options.integrity_failure == IntegrityFailure::Abort => {
                Err(err.into())
            }
            Err(err) => {
                warn!(error = %err, "discarding inconsistent persisted coverage");
                self.dependency_map.clear_all_source_coverage();
                Ok(())
            }
        }
    }

    /// Whether the dependency map currently holds usable coverage data.
    pub fn has_impact_analysis_data(&self) -> bool {
        self.has_impact_analysis_data
    }

    pub fn dependency_map(&self) -> &DynamicDependencyMap {
        &self.dependency_map
    }

    pub fn build_targets(&self) -> &Arc<BuildTargetList> {
        &self.build_targets
    }

    /// Location of the persisted coverage map for this runtime's suite.
    pub fn coverage_file(&self) -> &std::path::Path {
        &self.coverage_file
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Empties the dependency map and deletes the persisted file.
    pub fn clear_coverage_and_remove_file(&mut self) -> Result<(), RuntimeError> {
        self.dependency_map.clear_all_source_coverage();
        persist::remove_coverage_file(&self.coverage_file)
    }

    pub(crate) fn policy_state(&self) -> PolicyState {
        PolicyState {
            execution_failure: self.options.execution_failure,
            failed_test_coverage: self.options.failed_test_coverage,
            test_failure: self.options.test_failure,
            integrity_failure: self.options.integrity_failure,
            test_sharding: self.options.test_sharding,
            target_output_capture: self.options.target_output_capture,
        }
    }

    pub(crate) fn impact_policy_state(
        &self,
        test_prioritization: TestPrioritization,
        coverage_map_update: CoverageMapUpdate,
    ) -> ImpactAnalysisPolicyState {
        ImpactAnalysisPolicyState {
            base: self.policy_state(),
            test_prioritization,
            coverage_map_update,
        }
    }

    pub(crate) fn safe_impact_policy_state(
        &self,
        test_prioritization: TestPrioritization,
    ) -> SafeImpactAnalysisPolicyState {
        SafeImpactAnalysisPolicyState {
            base: self.policy_state(),
            test_prioritization,
        }
    }
}
