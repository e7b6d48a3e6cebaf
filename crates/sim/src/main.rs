use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use klee_core::config::load_dotenv;
use klee_search_sim::{simulate, Workload};
use klee_searcher::SearcherConfig;

/// Replay a searcher configuration against a synthetic workload.
///
/// Prints a JSON summary of the run; with `--trace`, the selection order too.
#[derive(Parser, Debug)]
#[command(name = "search-sim", about = "Smoke-test a state scheduler configuration")]
struct Args {
    /// Searcher config (TOML). Defaults apply when omitted.
    #[arg(long, env = "KLEE_SEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Workload seed; the searcher's own seed comes from the config
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Maximum number of select/notify rounds
    #[arg(long, default_value = "1000")]
    steps: usize,

    /// States alive at the start
    #[arg(long, default_value = "4")]
    initial_states: usize,

    /// Stop forking at this many live states
    #[arg(long, default_value = "64")]
    max_live: usize,

    /// Include the selection trace in the output
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SearcherConfig::from_file(path)
            .with_context(|| format!("failed to load searcher config {}", path.display()))?,
        None => SearcherConfig::from_toml("").context("failed to build default searcher config")?,
    };

    let workload = Workload {
        seed: args.seed,
        steps: args.steps,
        initial_states: args.initial_states,
        max_live: args.max_live,
        ..Default::default()
    };
    info!(seed = workload.seed, steps = workload.steps, "starting simulation");

    let run = simulate(&config, &workload).context("failed to build searcher")?;

    let mut out = serde_json::to_value(&run.summary).context("failed to serialize summary")?;
    if args.trace {
        out["trace"] = serde_json::to_value(&run.trace).context("failed to serialize trace")?;
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
