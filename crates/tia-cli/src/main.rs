//! `tia` — test impact analysis sequence driver.
//!
//! Loads the runtime configuration and the build-target descriptors, drives
//! one test sequence against the local engine, prints the sequence report as
//! JSON on stdout, and exits non-zero when the sequence did not succeed.
//!
//! ## Commands
//!
//! - `regular`: run every test target uninstrumented
//! - `seed`: run every test target instrumented and reseed the coverage map
//! - `impact`: run only the tests impacted by a change list
//! - `safe-impact`: impact analysis that also runs the discarded tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::{info, Level};

use tia_core::change_list::ChangeList;
use tia_core::init_tracing;
use tia_core::policy::{CoverageMapUpdate, TestPrioritization};
use tia_core::report::{SequenceReport, TestSequenceResult};
use tia_core::target::{ProductionTarget, SuiteType, TestTarget};
use tia_core::target_list::{BuildTargetList, TargetList};
use tia_engine::{LocalEngineConfig, LocalTestEngine};
use tia_runtime::{Runtime, RuntimeConfig, RuntimeOptions, SequenceCallbacks, SequenceSettings};

#[derive(Parser)]
#[command(name = "tia")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test impact analysis sequence driver", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Runtime configuration file (JSON)
    #[arg(long, global = true, default_value = "tia.json")]
    config: PathBuf,

    /// Build-target descriptor file (JSON)
    #[arg(long, global = true, default_value = "targets.json")]
    targets: PathBuf,

    /// Test suite to run
    #[arg(long, global = true, value_enum, default_value_t = SuiteArg::Main)]
    suite: SuiteArg,

    /// Override the persisted coverage map location
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    /// Per-target timeout in seconds
    #[arg(long, global = true)]
    target_timeout: Option<u64>,

    /// Whole-sequence timeout in seconds
    #[arg(long, global = true)]
    global_timeout: Option<u64>,

    /// Maximum concurrent test processes (defaults to logical CPU count)
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SuiteArg {
    Main,
    Periodic,
    Sandbox,
}

impl From<SuiteArg> for SuiteType {
    fn from(suite: SuiteArg) -> Self {
        match suite {
            SuiteArg::Main => SuiteType::Main,
            SuiteArg::Periodic => SuiteType::Periodic,
            SuiteArg::Sandbox => SuiteType::Sandbox,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrioritizationArg {
    None,
    DependencyLocality,
}

impl From<PrioritizationArg> for TestPrioritization {
    fn from(prioritization: PrioritizationArg) -> Self {
        match prioritization {
            PrioritizationArg::None => TestPrioritization::None,
            PrioritizationArg::DependencyLocality => TestPrioritization::DependencyLocality,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test target uninstrumented; the coverage map is untouched
    Regular,

    /// Run every test target instrumented and reseed the coverage map
    Seed,

    /// Run only the tests impacted by a change list
    Impact {
        /// Change list file (JSON with created/updated/deleted path arrays)
        #[arg(long)]
        change_list: PathBuf,

        #[arg(long, value_enum, default_value_t = PrioritizationArg::None)]
        prioritization: PrioritizationArg,

        /// Run uninstrumented and leave the coverage map as-is
        #[arg(long)]
        no_map_update: bool,
    },

    /// Impact analysis that also runs the discarded tests uninstrumented
    SafeImpact {
        /// Change list file (JSON with created/updated/deleted path arrays)
        #[arg(long)]
        change_list: PathBuf,

        #[arg(long, value_enum, default_value_t = PrioritizationArg::None)]
        prioritization: PrioritizationArg,
    },
}

/// Build-target descriptor file layout, as exported by the build system.
#[derive(Deserialize)]
struct TargetDescriptorFile {
    production: Vec<ProductionTarget>,
    tests: Vec<TestTarget>,
}

fn load_targets(path: &Path, suite: SuiteType) -> Result<BuildTargetList> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading target descriptors from {}", path.display()))?;
    let file: TargetDescriptorFile =
        serde_json::from_slice(&bytes).context("parsing target descriptors")?;

    let tests: Vec<TestTarget> = file
        .tests
        .into_iter()
        .filter(|target| target.suite == suite)
        .collect();

    Ok(BuildTargetList::new(
        TargetList::new(file.production).context("constructing production target list")?,
        TargetList::new(tests).context("constructing test target list")?,
    ))
}

fn load_change_list(path: &Path) -> Result<ChangeList> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading change list from {}", path.display()))?;
    serde_json::from_slice(&bytes).context("parsing change list")
}

fn progress_callbacks() -> SequenceCallbacks<'static> {
    SequenceCallbacks {
        on_job_complete: Some(Box::new(|job, completed, total| {
            info!(
                target = %job.target,
                result = ?job.result,
                duration_ms = job.duration_ms,
                completed,
                total,
                "test run complete"
            );
        })),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(
        cli.json,
        if cli.verbose { Level::DEBUG } else { Level::INFO },
    );

    let config = RuntimeConfig::load(&cli.config)
        .with_context(|| format!("loading runtime config from {}", cli.config.display()))?;
    let suite = SuiteType::from(cli.suite);
    let build_targets = load_targets(&cli.targets, suite)?;

    let engine = Arc::new(LocalTestEngine::new(LocalEngineConfig {
        artifact_dir: config.workspace.artifact_dir.clone(),
        instrumentation_binary: config.instrumentation_binary.clone(),
        max_concurrency: cli.max_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }),
    }));

    let options = RuntimeOptions {
        suite,
        data_file: cli.data_file.clone(),
        max_concurrency: cli.max_concurrency,
        ..Default::default()
    };
    let mut runtime = Runtime::new(config, build_targets, engine, options)
        .context("constructing the runtime")?;

    let settings = SequenceSettings {
        target_timeout: cli.target_timeout.map(Duration::from_secs),
        global_timeout: cli.global_timeout.map(Duration::from_secs),
    };
    let callbacks = progress_callbacks();

    let report = match &cli.command {
        Commands::Regular => {
            SequenceReport::Regular(runtime.regular_sequence(settings, callbacks).await)
        }
        Commands::Seed => {
            SequenceReport::Seed(runtime.seeded_sequence(settings, callbacks).await?)
        }
        Commands::Impact {
            change_list,
            prioritization,
            no_map_update,
        } => {
            let change_list = load_change_list(change_list)?;
            let map_update = if *no_map_update {
                CoverageMapUpdate::Discard
            } else {
                CoverageMapUpdate::Update
            };
            SequenceReport::ImpactAnalysis(
                runtime
                    .impact_analysis_sequence(
                        &change_list,
                        (*prioritization).into(),
                        map_update,
                        settings,
                        callbacks,
                    )
                    .await?,
            )
        }
        Commands::SafeImpact {
            change_list,
            prioritization,
        } => {
            let change_list = load_change_list(change_list)?;
            SequenceReport::SafeImpactAnalysis(
                runtime
                    .safe_impact_analysis_sequence(
                        &change_list,
                        (*prioritization).into(),
                        settings,
                        callbacks,
                    )
                    .await?,
            )
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.result() != TestSequenceResult::Success {
        std::process::exit(2);
    }
    Ok(())
}
