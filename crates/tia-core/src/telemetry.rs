//! Tracing initialisation for the runtime's binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Installs the global tracing subscriber for a sequence run.
///
/// The requested verbosity applies to the runtime's own crates; everything
/// else stays at `info`. `RUST_LOG` overrides both when set. With `json`
/// the sequence and job events come out as newline-delimited JSON for log
/// pipelines; otherwise a compact human-readable format is used. Repeated
/// calls are no-ops, since the global subscriber can only be installed once
/// per process.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,tia={level},tia_core={level},tia_engine={level},tia_runtime={level}"
        ))
    });

    let format_layer = if json {
        fmt::layer().json().flatten_event(true).boxed()
    } else {
        fmt::layer().compact().with_target(false).boxed()
    };

    let _ = Registry::default().with(filter).with(format_layer).try_init();
}
