//! Immutable, name-sorted, duplicate-free target collections.

use crate::error::TargetError;
use crate::target::{ProductionTarget, Target, TestTarget};

/// An ordered sequence of targets sorted lexicographically by name, with no
/// two elements sharing a name. Owns its targets for the process lifetime;
/// downstream code borrows from it.
#[derive(Debug, Clone)]
pub struct TargetList<T: Target> {
    targets: Vec<T>,
}

impl<T: Target> TargetList<T> {
    /// Consumes the descriptors, sorts them by name, and rejects empty input
    /// and duplicate names.
    pub fn new(mut targets: Vec<T>) -> Result<Self, TargetError> {
        if targets.is_empty() {
            return Err(TargetError::EmptyTargetList);
        }

        targets.sort_by(|lhs, rhs| lhs.name().cmp(rhs.name()));

        if let Some(pair) = targets.windows(2).find(|w| w[0].name() == w[1].name()) {
            return Err(TargetError::DuplicateTarget {
                name: pair[0].name().to_string(),
            });
        }

        Ok(Self { targets })
    }

    /// Returns the target with the specified name, if present. O(log n).
    pub fn get(&self, name: &str) -> Option<&T> {
        self.targets
            .binary_search_by(|target| target.name().cmp(name))
            .ok()
            .map(|index| &self.targets[index])
    }

    /// Returns the target with the specified name or fails.
    pub fn get_or_err(&self, name: &str) -> Result<&T, TargetError> {
        self.get(name).ok_or_else(|| TargetError::TargetNotFound {
            name: name.to_string(),
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The targets in name order.
    pub fn targets(&self) -> &[T] {
        &self.targets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The full set of build targets for one repository revision.
#[derive(Debug, Clone)]
pub struct BuildTargetList {
    production: TargetList<ProductionTarget>,
    tests: TargetList<TestTarget>,
}

impl BuildTargetList {
    pub fn new(production: TargetList<ProductionTarget>, tests: TargetList<TestTarget>) -> Self {
        Self { production, tests }
    }

    pub fn production_targets(&self) -> &TargetList<ProductionTarget> {
        &self.production
    }

    pub fn test_targets(&self) -> &TargetList<TestTarget> {
        &self.tests
    }
}
