//! Test-target exclusion policy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::target::{Target, TestTarget};
use crate::target_list::TargetList;

/// One exclusion input entry. An empty `excluded_test_cases` set excludes
/// the whole target; a non-empty set excludes only the named cases.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcludedTarget {
    pub name: String,

    #[serde(default)]
    pub excluded_test_cases: Vec<String>,
}

impl ExcludedTarget {
    /// Excludes the whole target.
    pub fn whole(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded_test_cases: Vec::new(),
        }
    }
}

/// Decides whether a test target is fully or partially excluded from a run.
/// Partially excluded targets still run; their case filters are passed
/// through to the launcher.
#[derive(Debug, Clone, Default)]
pub struct TestTargetExcludeList {
    fully_excluded: BTreeSet<String>,
    partial_filters: BTreeMap<String, Vec<String>>,
}

impl TestTargetExcludeList {
    /// Builds the exclude list, ignoring names that are not in the owning
    /// target list (with a warning).
    pub fn new(test_targets: &TargetList<TestTarget>, excluded: &[ExcludedTarget]) -> Self {
        let mut list = Self::default();
        for entry in excluded {
            if !test_targets.has(&entry.name) {
                warn!(
                    target = %entry.name,
                    "excluded test target is not in the target list, ignoring"
                );
                continue;
            }
            if entry.excluded_test_cases.is_empty() {
                list.fully_excluded.insert(entry.name.clone());
            } else {
                list.partial_filters
                    .insert(entry.name.clone(), entry.excluded_test_cases.clone());
            }
        }
        list
    }

    pub fn is_test_target_fully_excluded(&self, target: &TestTarget) -> bool {
        self.fully_excluded.contains(target.name())
    }

    /// Case filters for a partially excluded target.
    pub fn test_case_filters(&self, target: &TestTarget) -> Option<&[String]> {
        self.partial_filters.get(target.name()).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.fully_excluded.is_empty() && self.partial_filters.is_empty()
    }
}
