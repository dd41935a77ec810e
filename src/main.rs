//! Reference CLI entry point (spec.md §6): loads a built-in fixture, runs
//! the optimizer's violation-guided search over it, and prints the
//! before/after report.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "architect")]
#[command(about = "Run the architecture optimizer over a built-in fixture", long_about = None)]
struct Cli {
    /// Name of a built-in fixture to load (see --list)
    fixture: Option<String>,

    /// List available fixtures and exit
    #[arg(long)]
    list: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Maximum optimizer iterations
    #[arg(long, default_value_t = 100)]
    max_iterations: u64,

    /// Pareto front capacity
    #[arg(long, default_value_t = 5)]
    pareto_capacity: usize,

    /// Random seed the search is deterministic under
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("architect={log_level},architect_core={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.list {
        commands::list_fixtures();
        return Ok(());
    }

    let Some(fixture) = cli.fixture else {
        anyhow::bail!("a fixture name is required (see --list) or pass --list to enumerate fixtures");
    };

    let params = architect_core::OptimizerParams {
        max_iterations: cli.max_iterations,
        pareto_capacity: cli.pareto_capacity,
        seed: cli.seed,
        ..architect_core::OptimizerParams::default()
    };

    commands::run(&fixture, params)
}
