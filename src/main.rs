//! gcache daemon
//!
//! Classifies the machine's drives, promotes tracked files from the slow
//! drive to the fast one, and stays resident to keep the cache within budget.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gcache::hardware::SysinfoClassifier;
use gcache::tier::SystemMemory;
use gcache::{CacheConfig, CacheService, LocalFs, RunMode, ServiceState};

// =============================================================================
// CLI Arguments
// =============================================================================

/// gcache - transparent SSD/RAM cache for files on slow drives
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML, or JSON by extension)
    #[arg(long, env = "GCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GCACHE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "GCACHE_LOG_JSON")]
    log_json: bool,

    /// Use this directory as the cache root instead of <fast drive>/Cache
    #[arg(long, env = "GCACHE_CACHE_ROOT")]
    cache_root: Option<PathBuf>,

    /// Sweep this directory instead of the slow drive's mount point
    #[arg(long, env = "GCACHE_SLOW_ROOT")]
    slow_root: Option<PathBuf>,

    /// Where the cache index is persisted
    #[arg(long, env = "GCACHE_INDEX_PATH")]
    index_path: Option<PathBuf>,

    /// Run one sweep and one eviction pass, then exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<CacheConfig> {
        let mut config = match &self.config {
            Some(path) => CacheConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => CacheConfig::default(),
        };

        if let Some(root) = &self.cache_root {
            config.cache_root = Some(root.clone());
        }
        if let Some(root) = &self.slow_root {
            config.slow_root = Some(root.clone());
        }
        if let Some(path) = &self.index_path {
            config.index_path = path.clone();
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = Arc::new(args.load_config()?);

    info!("Starting gcache");
    info!("  Tracked extensions: {}", config.tracked_extensions.join(" "));
    info!("  Index: {}", config.index_path.display());
    info!("  Monitor interval: {:?}", config.monitor_interval());

    let service = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            CacheService::initialize(
                config,
                Arc::new(LocalFs::new()),
                &SysinfoClassifier::new(),
                Arc::new(SystemMemory::new()),
            )
        })
        .await
        .context("initialization task failed")?
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    let mode = if args.once {
        RunMode::Once
    } else {
        RunMode::Resident
    };
    service.run(shutdown, mode).await;

    if service.state() == ServiceState::FailedInit {
        let reason = service.status().init_error.unwrap_or_default();
        anyhow::bail!("initialization failed: {}", reason);
    }

    info!("gcache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
