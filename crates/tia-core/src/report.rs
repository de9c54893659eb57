//! Client-facing sequence reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{ImpactAnalysisPolicyState, PolicyState, SafeImpactAnalysisPolicyState};
use crate::target::SuiteType;

/// Outcome of one test-target execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestRunResult {
    /// The target was never scheduled (abort or exhausted budget).
    NotRun,
    /// The launcher could not execute the target.
    FailedToExecute,
    /// The run exceeded its timeout and was terminated.
    Timeout,
    AllTestsPass,
    TestFailures,
}

/// Outcome of one sequence phase, or of the sequence as a whole.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestSequenceResult {
    #[default]
    Success,
    Failure,
    Timeout,
}

impl TestSequenceResult {
    /// Merges two phase results into one: `Failure` dominates `Timeout`,
    /// which dominates `Success`.
    pub fn combine(self, other: TestSequenceResult) -> TestSequenceResult {
        use TestSequenceResult::*;
        match (self, other) {
            (Failure, _) | (_, Failure) => Failure,
            (Timeout, _) | (_, Timeout) => Timeout,
            (Success, Success) => Success,
        }
    }
}

/// Included/excluded partition of the targets offered to one phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunSelection {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

impl TestRunSelection {
    pub fn total(&self) -> usize {
        self.included.len() + self.excluded.len()
    }
}

/// Per-job record inside a phase report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestJobReport {
    pub target: String,

    /// Command string the launcher executed.
    pub command: String,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,

    pub result: TestRunResult,
}

/// One phase of a sequence: aggregate result, timing relative to the
/// sequence start, and the per-job data in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestRunReport {
    pub result: TestSequenceResult,

    /// Phase start relative to the sequence start.
    pub start_offset_ms: u64,

    pub duration_ms: u64,

    pub jobs: Vec<TestJobReport>,
}

impl TestRunReport {
    /// Number of jobs with the given result.
    pub fn count(&self, result: TestRunResult) -> usize {
        self.jobs.iter().filter(|j| j.result == result).count()
    }
}

/// Report for a regular (uninstrumented, run-everything) sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegularSequenceReport {
    pub sequence_id: Uuid,
    pub suite: SuiteType,
    pub max_concurrency: usize,
    pub target_timeout_ms: Option<u64>,
    pub global_timeout_ms: Option<u64>,
    pub policy: PolicyState,
    pub selected: TestRunSelection,
    pub run: TestRunReport,
}

impl RegularSequenceReport {
    pub fn result(&self) -> TestSequenceResult {
        self.run.result
    }
}

/// Report for a seeded (instrumented, run-everything, reseed the map)
/// sequence. Same shape as a regular report; the coverage side effects are
/// not part of the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedSequenceReport {
    pub sequence_id: Uuid,
    pub suite: SuiteType,
    pub max_concurrency: usize,
    pub target_timeout_ms: Option<u64>,
    pub global_timeout_ms: Option<u64>,
    pub policy: PolicyState,
    pub selected: TestRunSelection,
    pub run: TestRunReport,
}

impl SeedSequenceReport {
    pub fn result(&self) -> TestSequenceResult {
        self.run.result
    }
}

/// Report for an impact-analysis sequence: the selected phase plus the
/// drafted phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactAnalysisSequenceReport {
    pub sequence_id: Uuid,
    pub suite: SuiteType,
    pub max_concurrency: usize,
    pub target_timeout_ms: Option<u64>,
    pub global_timeout_ms: Option<u64>,
    pub policy: ImpactAnalysisPolicyState,
    pub selected: TestRunSelection,
    pub discarded: Vec<String>,
    pub drafted: Vec<String>,
    pub selected_run: TestRunReport,
    pub drafted_run: TestRunReport,
}

impl ImpactAnalysisSequenceReport {
    pub fn result(&self) -> TestSequenceResult {
        self.selected_run.result.combine(self.drafted_run.result)
    }
}

/// Report for a safe impact-analysis sequence: selected, discarded, and
/// drafted phases. The discarded set is itself partitioned by the regular
/// exclude list, so it is a full selection view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafeImpactAnalysisSequenceReport {
    pub sequence_id: Uuid,
    pub suite: SuiteType,
    pub max_concurrency: usize,
    pub target_timeout_ms: Option<u64>,
    pub global_timeout_ms: Option<u64>,
    pub policy: SafeImpactAnalysisPolicyState,
    pub selected: TestRunSelection,
    pub discarded: TestRunSelection,
    pub drafted: Vec<String>,
    pub selected_run: TestRunReport,
    pub discarded_run: TestRunReport,
    pub drafted_run: TestRunReport,
}

impl SafeImpactAnalysisSequenceReport {
    pub fn result(&self) -> TestSequenceResult {
        self.selected_run
            .result
            .combine(self.discarded_run.result)
            .combine(self.drafted_run.result)
    }
}

/// Any sequence report, tagged by mode. The end-of-sequence callback and the
/// CLI observe reports through this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SequenceReport {
    Regular(RegularSequenceReport),
    Seed(SeedSequenceReport),
    ImpactAnalysis(ImpactAnalysisSequenceReport),
    SafeImpactAnalysis(SafeImpactAnalysisSequenceReport),
}

impl SequenceReport {
    pub fn result(&self) -> TestSequenceResult {
        match self {
            SequenceReport::Regular(report) => report.result(),
            SequenceReport::Seed(report) => report.result(),
            SequenceReport::ImpactAnalysis(report) => report.result(),
            SequenceReport::SafeImpactAnalysis(report) => report.result(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_result_combine_failure_dominates() {
        use TestSequenceResult::*;
        assert_eq!(Success.combine(Success), Success);
        assert_eq!(Success.combine(Timeout), Timeout);
        assert_eq!(Timeout.combine(Failure), Failure);
        assert_eq!(Failure.combine(Timeout), Failure);
        assert_eq!(Timeout.combine(Success), Timeout);
    }

    #[test]
    fn test_run_result_serde_roundtrip() {
        for result in [
            TestRunResult::NotRun,
            TestRunResult::FailedToExecute,
            TestRunResult::Timeout,
            TestRunResult::AllTestsPass,
            TestRunResult::TestFailures,
        ] {
            let json = serde_json::to_string(&result).expect("serialize");
            let deserialized: TestRunResult = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(result, deserialized);
        }
    }

    #[test]
    fn test_run_report_counts_results() {
        let report = TestRunReport {
            result: TestSequenceResult::Failure,
            start_offset_ms: 0,
            duration_ms: 500,
            jobs: vec![
                TestJobReport {
                    target: "T1".to_string(),
                    command: "bin/t1".to_string(),
                    started_at: Utc::now(),
                    duration_ms: 300,
                    result: TestRunResult::AllTestsPass,
                },
                TestJobReport {
                    target: "T2".to_string(),
                    command: "bin/t2".to_string(),
                    started_at: Utc::now(),
                    duration_ms: 200,
                    result: TestRunResult::TestFailures,
                },
            ],
        };

        assert_eq!(report.count(TestRunResult::AllTestsPass), 1);
        assert_eq!(report.count(TestRunResult::TestFailures), 1);
        assert_eq!(report.count(TestRunResult::NotRun), 0);
    }

    #[test]
    fn test_impact_report_result_combines_phases() {
        let report = ImpactAnalysisSequenceReport {
            sequence_id: Uuid::new_v4(),
            suite: SuiteType::Main,
            max_concurrency: 4,
            target_timeout_ms: None,
            global_timeout_ms: Some(1_000),
            policy: ImpactAnalysisPolicyState::default(),
            selected: TestRunSelection::default(),
            discarded: Vec::new(),
            drafted: Vec::new(),
            selected_run: TestRunReport::default(),
            drafted_run: TestRunReport {
                result: TestSequenceResult::Timeout,
                ..Default::default()
            },
        };
        assert_eq!(report.result(), TestSequenceResult::Timeout);
    }

    #[test]
    fn test_sequence_report_serde_tags_mode() {
        let report = SequenceReport::Regular(RegularSequenceReport {
            sequence_id: Uuid::new_v4(),
            suite: SuiteType::Main,
            max_concurrency: 2,
            target_timeout_ms: None,
            global_timeout_ms: None,
            policy: PolicyState::default(),
            selected: TestRunSelection::default(),
            run: TestRunReport::default(),
        });

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["mode"], "regular");

        let roundtrip: SequenceReport = serde_json::from_value(json).expect("deserialize");
        assert_eq!(report, roundtrip);
    }
}
