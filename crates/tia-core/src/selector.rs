//! Test selection and prioritization from resolved change lists.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::change_list::ChangeDependencyList;
use crate::policy::TestPrioritization;
use crate::target::{Target, TestTarget};
use crate::target_list::BuildTargetList;

/// Picks the test targets pertinent to a resolved change list.
pub struct TestSelector {
    build_targets: Arc<BuildTargetList>,
}

impl TestSelector {
    pub fn new(build_targets: Arc<BuildTargetList>) -> Self {
        Self { build_targets }
    }

    /// Returns the selected test targets, deduplicated, in the order implied
    /// by the prioritization policy.
    ///
    /// A changed source selects the tests covering it and any test targets
    /// it belongs to directly. With [`TestPrioritization::None`] the result
    /// is in target-list order. With
    /// [`TestPrioritization::DependencyLocality`] targets implicated by more
    /// distinct changed sources come first, ties broken by target-list order.
    pub fn select_test_targets<'a>(
        &'a self,
        change_dependency_list: &ChangeDependencyList,
        prioritization: TestPrioritization,
    ) -> Vec<&'a TestTarget> {
        // Per test target, the distinct changed sources implicating it.
        let mut implicated: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for dependency in &change_dependency_list.source_dependencies {
            for name in dependency
                .parent_test_targets
                .iter()
                .chain(dependency.covering_tests.iter())
            {
                implicated
                    .entry(name.clone())
                    .or_default()
                    .insert(dependency.path.clone());
            }
        }

        let mut selected: Vec<&TestTarget> = self
            .build_targets
            .test_targets()
            .iter()
            .filter(|target| implicated.contains_key(target.name()))
            .collect();

        if prioritization == TestPrioritization::DependencyLocality {
            selected.sort_by(|lhs, rhs| {
                let lhs_locality = implicated[lhs.name()].len();
                let rhs_locality = implicated[rhs.name()].len();
                rhs_locality
                    .cmp(&lhs_locality)
                    .then_with(|| lhs.name().cmp(rhs.name()))
            });
        }

        debug!(
            selected = selected.len(),
            total = self.build_targets.test_targets().len(),
            ?prioritization,
            "selected test targets for change list"
        );

        selected
    }
}
