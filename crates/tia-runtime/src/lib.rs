//! Sequence orchestration for the test impact analysis runtime.
//!
//! [`Runtime`] owns the build targets, the dynamic dependency map, and the
//! exclusion policy, and drives the four sequence modes against a
//! [`TestEngine`](tia_engine::TestEngine): regular, seeded, impact-analysis,
//! and safe impact-analysis.

pub mod config;
pub mod consolidate;
pub mod persist;
pub mod runtime;
pub mod sequence;

pub use config::{RuntimeConfig, WorkspaceConfig, DEFAULT_COVERAGE_FILE_NAME};
pub use runtime::{Runtime, RuntimeOptions};
pub use sequence::{SequenceCallbacks, SequenceSettings, SequenceStartInfo};
