//! Runtime configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tia_core::error::{RuntimeError, SerializationError};
use tia_core::exclude::ExcludedTarget;

/// Default file name of the persisted coverage map inside a suite's
/// workspace directory.
pub const DEFAULT_COVERAGE_FILE_NAME: &str = "spartia.json";

fn default_coverage_file_name() -> String {
    DEFAULT_COVERAGE_FILE_NAME.to_string()
}

/// Workspace paths used by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Root directory for per-suite persisted data. The coverage map lives
    /// at `<active_root>/<suite>/<coverage_file_name>`.
    pub active_root: PathBuf,

    #[serde(default = "default_coverage_file_name")]
    pub coverage_file_name: String,

    /// Directory the engine writes run artifacts into.
    pub artifact_dir: PathBuf,
}

/// Top-level runtime configuration, typically loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Absolute repository root all coverage paths are made relative to.
    pub repo_root: PathBuf,

    pub workspace: WorkspaceConfig,

    /// Coverage instrumentation wrapper for the local engine.
    #[serde(default)]
    pub instrumentation_binary: Option<PathBuf>,

    /// Exclusions applied to uninstrumented runs.
    #[serde(default)]
    pub excluded_regular_test_targets: Vec<ExcludedTarget>,

    /// Exclusions applied to instrumented runs.
    #[serde(default)]
    pub excluded_instrumented_test_targets: Vec<ExcludedTarget>,
}

impl RuntimeConfig {
    /// Loads the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let bytes = std::fs::read(path)?;
        let config = serde_json::from_slice(&bytes).map_err(SerializationError::Malformed)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialize_with_defaults() {
        let json = r#"{
            "repo_root": "/repo",
            "workspace": {
                "active_root": "/workspace/active",
                "artifact_dir": "/workspace/artifacts"
            }
        }"#;

        let config: RuntimeConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.workspace.coverage_file_name, DEFAULT_COVERAGE_FILE_NAME);
        assert!(config.instrumentation_binary.is_none());
        assert!(config.excluded_regular_test_targets.is_empty());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = RuntimeConfig {
            repo_root: PathBuf::from("/repo"),
            workspace: WorkspaceConfig {
                active_root: PathBuf::from("/workspace/active"),
                coverage_file_name: "coverage.json".to_string(),
                artifact_dir: PathBuf::from("/workspace/artifacts"),
            },
            instrumentation_binary: Some(PathBuf::from("/tools/instrument")),
            excluded_regular_test_targets: vec![ExcludedTarget::whole("TFlaky")],
            excluded_instrumented_test_targets: Vec::new(),
        };

        let json = serde_json::to_string(&config).expect("serialize");
        let roundtrip: RuntimeConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, roundtrip);
    }
}
