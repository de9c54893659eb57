//! Change lists and their resolved dependency annotations.

use serde::{Deserialize, Serialize};

/// Files created, updated, or deleted between two revisions. Paths are
/// repo-relative with forward slashes; the three sets are disjoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChangeList {
    #[serde(default)]
    pub created: Vec<String>,

    #[serde(default)]
    pub updated: Vec<String>,

    #[serde(default)]
    pub deleted: Vec<String>,
}

impl ChangeList {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// How a changed source entered the change list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

/// A changed source annotated with the build targets it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDependency {
    pub path: String,

    pub operation: ChangeOperation,

    /// Production targets whose source lists contain this path.
    pub parent_production_targets: Vec<String>,

    /// Test targets whose source lists contain this path.
    pub parent_test_targets: Vec<String>,

    /// Test targets the dependency map records as covering this path.
    pub covering_tests: Vec<String>,
}

/// A change list resolved against the build targets and the dependency map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDependencyList {
    pub source_dependencies: Vec<SourceDependency>,
}
