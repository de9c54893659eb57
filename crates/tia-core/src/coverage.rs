//! Source-to-test coverage data.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The test targets known to exercise one repo-relative source file. The
/// covering set is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCoveringTests {
    path: String,
    covering_tests: BTreeSet<String>,
}

impl SourceCoveringTests {
    pub fn new(path: impl Into<String>, covering_tests: BTreeSet<String>) -> Self {
        Self {
            path: path.into(),
            covering_tests,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn covering_tests(&self) -> &BTreeSet<String> {
        &self.covering_tests
    }
}

/// Source-keyed collection of covering-test sets. Keys are unique and
/// iterate in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCoveringTestsList {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl SourceCoveringTestsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from entries, merging covering sets for repeated paths
    /// and dropping entries with no covering tests.
    pub fn from_entries(entries: impl IntoIterator<Item = SourceCoveringTests>) -> Self {
        let mut list = Self::new();
        for entry in entries {
            for test in entry.covering_tests {
                list.insert(entry.path.clone(), test);
            }
        }
        list
    }

    /// Records that `test` covers `path`.
    pub fn insert(&mut self, path: impl Into<String>, test: impl Into<String>) {
        self.entries
            .entry(path.into())
            .or_default()
            .insert(test.into());
    }

    pub fn get(&self, path: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(path)
    }

    /// Iterates `(source path, covering tests)` in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The absolute source paths touched by one instrumented test run, as read
/// from the launcher's coverage artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TestCoverage {
    pub sources: Vec<PathBuf>,
}
