//! Core domain model for the test impact analysis runtime.
//!
//! Re-exports the types the orchestration and engine crates build on: build
//! and test targets, the dynamic dependency map, test selection, exclusion
//! policy, coverage data and its serialized form, and the sequence reports
//! returned to clients.

pub mod change_list;
pub mod coverage;
pub mod dependency_map;
pub mod error;
pub mod exclude;
pub mod policy;
pub mod report;
pub mod selector;
pub mod serializer;
pub mod target;
pub mod target_list;
pub mod telemetry;

pub use change_list::{ChangeDependencyList, ChangeList, ChangeOperation, SourceDependency};
pub use coverage::{SourceCoveringTests, SourceCoveringTestsList, TestCoverage};
pub use dependency_map::DynamicDependencyMap;
pub use error::{DependencyError, RuntimeError, SerializationError, TargetError};
pub use exclude::{ExcludedTarget, TestTargetExcludeList};
pub use policy::{
    CoverageMapUpdate, ExecutionFailure, FailedTestCoverage, ImpactAnalysisPolicyState,
    IntegrityFailure, PolicyState, SafeImpactAnalysisPolicyState, TargetOutputCapture,
    TestFailure, TestPrioritization, TestSharding,
};
pub use report::{
    ImpactAnalysisSequenceReport, RegularSequenceReport, SafeImpactAnalysisSequenceReport,
    SeedSequenceReport, SequenceReport, TestJobReport, TestRunReport, TestRunResult,
    TestRunSelection, TestSequenceResult,
};
pub use selector::TestSelector;
pub use target::{LaunchSpec, ProductionTarget, SuiteType, Target, TargetDescriptor, TestTarget};
pub use target_list::{BuildTargetList, TargetList};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
