//! Build and test target descriptions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Named grouping of test targets. Each suite persists its own coverage map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuiteType {
    Main,
    Periodic,
    Sandbox,
}

impl SuiteType {
    /// Stable name used for the per-suite workspace directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteType::Main => "main",
            SuiteType::Periodic => "periodic",
            SuiteType::Sandbox => "sandbox",
        }
    }
}

/// Fields common to production and test targets: identity plus the
/// repo-relative sources built into the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Unique target name.
    pub name: String,

    /// Repo-relative paths of the sources belonging to this target.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Lookup behaviour shared by the two target flavours.
pub trait Target {
    fn name(&self) -> &str;
    fn sources(&self) -> &[String];
}

/// A non-test build artifact; a source of covered files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProductionTarget {
    pub descriptor: TargetDescriptor,
}

impl ProductionTarget {
    pub fn new(descriptor: TargetDescriptor) -> Self {
        Self { descriptor }
    }
}

impl Target for ProductionTarget {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn sources(&self) -> &[String] {
        &self.descriptor.sources
    }
}

/// Metadata the launcher needs to execute a test target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Working directory for the launched process.
    pub working_dir: PathBuf,

    /// Per-run timeout hint in milliseconds. `None` defers to the sequence
    /// settings.
    #[serde(default)]
    pub timeout_hint_ms: Option<u64>,
}

impl LaunchSpec {
    /// The full command as a single display string.
    pub fn command_string(&self) -> String {
        self.command.join(" ")
    }
}

/// A build artifact that runs test cases and, when instrumented, reports the
/// source paths it touched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestTarget {
    #[serde(flatten)]
    pub descriptor: TargetDescriptor,

    /// Suite this target belongs to.
    pub suite: SuiteType,

    pub launch: LaunchSpec,
}

impl Target for TestTarget {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn sources(&self) -> &[String] {
        &self.descriptor.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_type_names() {
        assert_eq!(SuiteType::Main.as_str(), "main");
        assert_eq!(SuiteType::Periodic.as_str(), "periodic");
        assert_eq!(SuiteType::Sandbox.as_str(), "sandbox");
    }

    #[test]
    fn test_suite_type_serde() {
        for suite in [SuiteType::Main, SuiteType::Periodic, SuiteType::Sandbox] {
            let json = serde_json::to_string(&suite).expect("serialize");
            let deserialized: SuiteType = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(suite, deserialized);
        }
    }

    #[test]
    fn test_test_target_serde_flattens_descriptor() {
        let target = TestTarget {
            descriptor: TargetDescriptor {
                name: "CoreTests".to_string(),
                sources: vec!["tests/core_tests.cpp".to_string()],
            },
            suite: SuiteType::Main,
            launch: LaunchSpec {
                command: vec!["bin/core_tests".to_string()],
                working_dir: PathBuf::from("."),
                timeout_hint_ms: None,
            },
        };

        let json = serde_json::to_value(&target).expect("serialize");
        assert_eq!(json["name"], "CoreTests");
        assert_eq!(json["suite"], "main");

        let roundtrip: TestTarget = serde_json::from_value(json).expect("deserialize");
        assert_eq!(target, roundtrip);
    }

    #[test]
    fn test_command_string_joins_arguments() {
        let launch = LaunchSpec {
            command: vec![
                "bin/core_tests".to_string(),
                "--gtest_shuffle".to_string(),
            ],
            working_dir: PathBuf::from("."),
            timeout_hint_ms: Some(30_000),
        };
        assert_eq!(launch.command_string(), "bin/core_tests --gtest_shuffle");
    }
}
