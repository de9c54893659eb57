//! The dynamic dependency map: the maintained bidirectional source↔test
//! coverage relation.
//!
//! The forward direction maps repo-relative source paths to the names of the
//! test targets covering them; the inverse maps test-target names to the
//! sources they cover. The two directions are kept mutually consistent by
//! confining mutation to [`DynamicDependencyMap::replace_source_coverage`],
//! [`DynamicDependencyMap::remove_test_target_coverage`], and
//! [`DynamicDependencyMap::clear_all_source_coverage`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use crate::change_list::{
    ChangeDependencyList, ChangeList, ChangeOperation, SourceDependency,
};
use crate::coverage::SourceCoveringTestsList;
use crate::error::DependencyError;
use crate::policy::IntegrityFailure;
use crate::target::{Target, TestTarget};
use crate::target_list::BuildTargetList;

pub struct DynamicDependencyMap {
    build_targets: Arc<BuildTargetList>,
    source_to_tests: BTreeMap<String, BTreeSet<String>>,
    test_to_sources: BTreeMap<String, BTreeSet<String>>,
}

impl DynamicDependencyMap {
    /// Creates an empty map over the given build targets.
    pub fn new(build_targets: Arc<BuildTargetList>) -> Self {
        Self {
            build_targets,
            source_to_tests: BTreeMap::new(),
            test_to_sources: BTreeMap::new(),
        }
    }

    pub fn build_targets(&self) -> &Arc<BuildTargetList> {
        &self.build_targets
    }

    /// Merges the coverage in `list` into the relation: each source's
    /// covering set is unioned with the incoming tests, both directions kept
    /// consistent. Sources absent from `list` are untouched. A caller
    /// refreshing a target's coverage prunes it first with
    /// [`Self::remove_test_target_coverage`], so stale pairs for that target
    /// are gone before the new ones land. Names are validated up front, so a
    /// failed replace leaves the map unmodified.
    pub fn replace_source_coverage(
        &mut self,
        list: &SourceCoveringTestsList,
    ) -> Result<(), DependencyError> {
        for (_, tests) in list.iter() {
            for test in tests {
                if !self.build_targets.test_targets().has(test) {
                    return Err(DependencyError::UnknownTestTarget { name: test.clone() });
                }
            }
        }

        for (path, tests) in list.iter() {
            let covering = self.source_to_tests.entry(path.clone()).or_default();
            for test in tests {
                covering.insert(test.clone());
                self.test_to_sources
                    .entry(test.clone())
                    .or_default()
                    .insert(path.clone());
            }
        }

        Ok(())
    }

    /// Erases the target's name from every covering set and clears its
    /// inverse entry. Sources whose covering set becomes empty are dropped.
    pub fn remove_test_target_coverage(&mut self, test_target: &str) {
        if let Some(sources) = self.test_to_sources.remove(test_target) {
            for source in sources {
                if let Some(tests) = self.source_to_tests.get_mut(&source) {
                    tests.remove(test_target);
                    if tests.is_empty() {
                        self.source_to_tests.remove(&source);
                    }
                }
            }
        }
    }

    /// Empties both directions. Does not touch any persisted file.
    pub fn clear_all_source_coverage(&mut self) {
        self.source_to_tests.clear();
        self.test_to_sources.clear();
    }

    /// The current covering relation, sources and covering sets in
    /// lexicographic order. Deterministic.
    pub fn export_source_coverage(&self) -> SourceCoveringTestsList {
        let mut list = SourceCoveringTestsList::new();
        for (path, tests) in &self.source_to_tests {
            for test in tests {
                list.insert(path.clone(), test.clone());
            }
        }
        list
    }

    /// The test targets covering `source`, if any.
    pub fn covering_tests(&self, source: &str) -> Option<&BTreeSet<String>> {
        self.source_to_tests.get(source)
    }

    /// Test targets with no coverage entries, in target-list order.
    pub fn not_covering_tests(&self) -> Vec<&TestTarget> {
        self.build_targets
            .test_targets()
            .iter()
            .filter(|target| {
                self.test_to_sources
                    .get(target.name())
                    .map_or(true, BTreeSet::is_empty)
            })
            .collect()
    }

    pub fn has_source_coverage(&self) -> bool {
        !self.source_to_tests.is_empty()
    }

    /// Resolves each changed path against the build targets and the current
    /// covering relation. The map itself is not modified.
    ///
    /// Under [`IntegrityFailure::Abort`] an inconsistent entry fails the
    /// whole resolution; under [`IntegrityFailure::Continue`] it is logged
    /// and skipped, yielding a partial result.
    pub fn apply_and_resolve_change_list(
        &self,
        change_list: &ChangeList,
        integrity_failure: IntegrityFailure,
    ) -> Result<ChangeDependencyList, DependencyError> {
        let mut source_dependencies = Vec::new();

        for path in &change_list.created {
            if self.covering_tests(path).is_some_and(|t| !t.is_empty()) {
                let err = DependencyError::CreatedSourceAlreadyTracked { path: path.clone() };
                if integrity_failure == IntegrityFailure::Abort {
                    return Err(err);
                }
                warn!(error = %err, "skipping inconsistent change-list entry");
                continue;
            }
            let (parent_production_targets, parent_test_targets) = self.parent_targets(path);
            if parent_production_targets.is_empty() && parent_test_targets.is_empty() {
                warn!(path = %path, "created source belongs to no build target, skipping");
                continue;
            }
            source_dependencies.push(SourceDependency {
                path: path.clone(),
                operation: ChangeOperation::Create,
                parent_production_targets,
                parent_test_targets,
                covering_tests: Vec::new(),
            });
        }

        for path in &change_list.updated {
            let (parent_production_targets, parent_test_targets) = self.parent_targets(path);
            let covering_tests = self.covering_names(path);
            if parent_production_targets.is_empty()
                && parent_test_targets.is_empty()
                && covering_tests.is_empty()
            {
                warn!(path = %path, "updated source is unknown to the build and the map, skipping");
                continue;
            }
            source_dependencies.push(SourceDependency {
                path: path.clone(),
                operation: ChangeOperation::Update,
                parent_production_targets,
                parent_test_targets,
                covering_tests,
            });
        }

        for path in &change_list.deleted {
            let (parent_production_targets, parent_test_targets) = self.parent_targets(path);
            if let Some(target) = parent_production_targets
                .first()
                .or(parent_test_targets.first())
            {
                let err = DependencyError::DeletedSourceStillClaimed {
                    path: path.clone(),
                    target: target.clone(),
                };
                if integrity_failure == IntegrityFailure::Abort {
                    return Err(err);
                }
                warn!(error = %err, "skipping inconsistent change-list entry");
                continue;
            }
            let covering_tests = self.covering_names(path);
            if covering_tests.is_empty() {
                continue;
            }
            source_dependencies.push(SourceDependency {
                path: path.clone(),
                operation: ChangeOperation::Delete,
                parent_production_targets: Vec::new(),
                parent_test_targets: Vec::new(),
                covering_tests,
            });
        }

        Ok(ChangeDependencyList {
            source_dependencies,
        })
    }

    fn covering_names(&self, path: &str) -> Vec<String> {
        self.source_to_tests
            .get(path)
            .map(|tests| tests.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn parent_targets(&self, path: &str) -> (Vec<String>, Vec<String>) {
        let production = self
            .build_targets
            .production_targets()
            .iter()
            .filter(|target| target.sources().iter().any(|source| source == path))
            .map(|target| target.name().to_string())
            .collect();
        let tests = self
            .build_targets
            .test_targets()
            .iter()
            .filter(|target| target.sources().iter().any(|source| source == path))
            .map(|target| target.name().to_string())
            .collect();
        (production, tests)
    }
}
