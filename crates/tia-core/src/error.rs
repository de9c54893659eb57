//! Error taxonomy for the runtime.

/// Invariant violations during target-list construction and lookup.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("target list is empty")]
    EmptyTargetList,

    #[error("target list contains duplicate target '{name}'")]
    DuplicateTarget { name: String },

    #[error("couldn't find target '{name}'")]
    TargetNotFound { name: String },
}

/// Change-list resolution and coverage-data consistency failures.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("coverage data references unknown test target '{name}'")]
    UnknownTestTarget { name: String },

    #[error("created source '{path}' already has coverage entries")]
    CreatedSourceAlreadyTracked { path: String },

    #[error("deleted source '{path}' is still claimed by target '{target}'")]
    DeletedSourceStillClaimed { path: String, target: String },
}

/// Persisted coverage-map decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("malformed coverage data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported coverage data version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("coverage data digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
}

/// Orchestration-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("test target '{target}' completed its run successfully but produced no coverage data (command: '{command}')")]
    MissingCoverage { target: String, command: String },

    #[error("dependency integrity failure: {0}")]
    Dependency(#[from] DependencyError),

    #[error("coverage data error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("target error: {0}")]
    Target(#[from] TargetError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_error_display() {
        let err = TargetError::DuplicateTarget {
            name: "CoreTests".to_string(),
        };
        assert!(err.to_string().contains("duplicate"));
        assert!(err.to_string().contains("CoreTests"));

        let err = TargetError::TargetNotFound {
            name: "MissingTests".to_string(),
        };
        assert!(err.to_string().contains("couldn't find target 'MissingTests'"));
    }

    #[test]
    fn test_dependency_error_display() {
        let err = DependencyError::UnknownTestTarget {
            name: "GhostTests".to_string(),
        };
        assert!(err.to_string().contains("unknown test target"));
        assert!(err.to_string().contains("GhostTests"));
    }

    #[test]
    fn test_serialization_error_version() {
        let err = SerializationError::UnsupportedVersion {
            found: 9,
            expected: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn test_runtime_error_wraps_dependency_error() {
        let err = RuntimeError::from(DependencyError::CreatedSourceAlreadyTracked {
            path: "src/new.cpp".to_string(),
        });
        assert!(err.to_string().contains("dependency integrity failure"));
        assert!(err.to_string().contains("src/new.cpp"));
    }
}
