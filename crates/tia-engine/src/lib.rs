//! Test engine boundary for the test impact analysis runtime.
//!
//! The orchestrator drives test targets through the [`TestEngine`] trait.
//! [`local::LocalTestEngine`] launches real child processes;
//! [`fakes::ScriptedTestEngine`] satisfies the same contract in memory for
//! tests.

pub mod engine;
pub mod fakes;
pub mod job;
pub mod local;

pub use engine::{JobObserver, NullObserver, RunSettings, TestEngine};
pub use job::{AsTestJob, InstrumentedTestJob, RunOutcome, TestJob};
pub use local::{LocalEngineConfig, LocalTestEngine};
