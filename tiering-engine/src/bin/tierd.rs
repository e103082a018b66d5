//! `tierd`: the tiering engine daemon. Loads configuration, wires the
//! engine, and blocks until a shutdown signal is received.
//!
//! A `clap` struct with `env` fallbacks overrides fields loaded from the
//! JSON config file, so the same binary works from a config file, from
//! environment variables in a container, or from ad-hoc flags.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tiering_engine::TieringConfig;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "tierd", about = "Tiering engine daemon")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "TIERD_CONFIG")]
    config: PathBuf,

    /// Overrides `pool_root` from the config file.
    #[arg(long, env = "TIERD_POOL_ROOT")]
    pool_root: Option<PathBuf>,

    /// Overrides `metadata_path` from the config file.
    #[arg(long, env = "TIERD_METADATA_PATH")]
    metadata_path: Option<PathBuf>,

    /// Overrides `io_threads` from the config file.
    #[arg(short = 't', long, env = "TIERD_IO_THREADS")]
    threads: Option<usize>,

    /// Overrides `dry_run` from the config file; log migrations instead of
    /// performing them.
    #[arg(long, env = "TIERD_DRYRUN")]
    dryrun: bool,
}

fn main() -> anyhow::Result<()> {
    init_observability();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "starting tiering engine daemon");

    let mut config = TieringConfig::load(&cli.config)?;
    if let Some(pool_root) = cli.pool_root {
        config.pool_root = pool_root;
    }
    if let Some(metadata_path) = cli.metadata_path {
        config.metadata_path = metadata_path;
    }
    if let Some(threads) = cli.threads {
        config.io_threads = threads;
    }
    if cli.dryrun {
        config.dry_run = true;
    }
    config.validate()?;

    if config.dry_run {
        warn!("running in dry-run mode: no files will actually be moved");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    tiering_engine::supervisor::install_signal_handler(Arc::clone(&shutdown))?;

    let supervisor = tiering_engine::spawn(config, Arc::clone(&shutdown))?;

    while !shutdown.load(std::sync::atomic::Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    supervisor.shutdown();
    info!("tiering engine daemon stopped");
    Ok(())
}

fn init_observability() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .json();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tiering_engine=debug".into());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
