//! Sequence policies and the policy state captured into reports.

use serde::{Deserialize, Serialize};

/// How to proceed when a test target fails to execute at all.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionFailure {
    /// Stop scheduling further targets and fail the phase.
    Abort,
    /// Keep going; the failure is reported and counts against the phase.
    #[default]
    Continue,
    /// Keep going; the failure is reported but does not fail the phase.
    Ignore,
}

/// Whether coverage produced by a run with failing tests is ingested.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailedTestCoverage {
    Keep,
    #[default]
    Discard,
}

/// How to proceed when a test target completes with failing tests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestFailure {
    Abort,
    #[default]
    Continue,
}

/// Whether consistency violations in coverage or change-list data abort the
/// sequence or are logged and skipped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityFailure {
    #[default]
    Abort,
    Continue,
}

/// Whether test targets may be sharded across concurrent launcher slots.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestSharding {
    #[default]
    Never,
    Always,
}

/// What the launcher does with a target's stdout/stderr.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetOutputCapture {
    #[default]
    None,
    StdOut,
    File,
    StdOutAndFile,
}

/// Ordering applied to the selected test targets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestPrioritization {
    #[default]
    None,
    /// Targets implicated by more of the changed sources run first.
    DependencyLocality,
}

/// Whether an impact-analysis sequence feeds its coverage back into the map.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMapUpdate {
    Discard,
    #[default]
    Update,
}

/// Snapshot of the policies in effect for a sequence. Identical policy state
/// across two runs is the reproducibility contract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyState {
    pub execution_failure: ExecutionFailure,
    pub failed_test_coverage: FailedTestCoverage,
    pub test_failure: TestFailure,
    pub integrity_failure: IntegrityFailure,
    pub test_sharding: TestSharding,
    pub target_output_capture: TargetOutputCapture,
}

/// Policy state for an impact-analysis sequence.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImpactAnalysisPolicyState {
    #[serde(flatten)]
    pub base: PolicyState,
    pub test_prioritization: TestPrioritization,
    pub coverage_map_update: CoverageMapUpdate,
}

/// Policy state for a safe impact-analysis sequence.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafeImpactAnalysisPolicyState {
    #[serde(flatten)]
    pub base: PolicyState,
    pub test_prioritization: TestPrioritization,
}
