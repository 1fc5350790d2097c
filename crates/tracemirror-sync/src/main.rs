//! Tracemirror sync daemon.
//!
//! Polls a chain node for supply-chain contract events and mirrors them into
//! a local SQLite store.
//!
//! # Usage
//!
//! ```bash
//! # Configure through the environment (or a .env file)
//! export TRACEMIRROR_RPC_URL=http://localhost:8545
//! export TRACEMIRROR_ADDRESSES=0x5FbDB2315678afecb367f032d93F642f64180aa3
//! export TRACEMIRROR_SCHEMAS=artifacts/SupplyChain.json
//! tracemirror-sync
//!
//! # Override a few settings on the command line
//! tracemirror-sync --db-path /var/lib/tracemirror/mirror.db --start-block 1200
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM for graceful shutdown:
//! 1. Stops scheduling new fetches
//! 2. Lets a batch that is already being applied commit or roll back
//! 3. Exits cleanly

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracemirror_core::Registry;
use tracemirror_core::metrics::{init_metrics, start_metrics_server};
use tracemirror_sync::{Config, PollLoop, Reconciler, RoleMap, RpcOrigin, StoreGateway, StorePool};
use tracing_subscriber::EnvFilter;

/// How long a batch waits for a pooled store connection.
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracemirror sync daemon.
#[derive(Parser, Debug)]
#[command(name = "tracemirror-sync")]
#[command(about = "Mirror supply-chain contract events into SQLite")]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// SQLite database path (overrides TRACEMIRROR_DB_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// First block to mirror when the store is empty (overrides TRACEMIRROR_START_BLOCK)
    #[arg(long)]
    start_block: Option<u64>,

    /// Metrics HTTP server port, 0 to disable (overrides TRACEMIRROR_METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env file if it exists
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)
            .with_context(|| format!("Failed to load {}", args.dotenv))?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tracemirror_sync=debug")),
        )
        .init();

    tracing::info!("Tracemirror sync daemon starting...");

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(start_block) = args.start_block {
        config.start_block = Some(start_block);
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }

    // Initialize metrics
    if config.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(config.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
    }

    let registry = Registry::load(&config.schema_paths).context("Failed to load event schemas")?;
    tracing::info!(schemas = registry.len(), "event registry loaded");

    let roles = RoleMap::from_entries(&config.roles).context("Invalid role configuration")?;

    let pool = StorePool::open(&config.db_path, config.pool_size, POOL_ACQUIRE_TIMEOUT)
        .await
        .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?;

    let origin = RpcOrigin::new(config.rpc_config()).context("Failed to build RPC client")?;

    tracing::info!("Configuration:");
    tracing::info!("  RPC: {}", origin.endpoint());
    tracing::info!("  Store: {}", config.db_path.display());
    tracing::info!("  Contracts: {}", config.addresses.len());
    tracing::info!("  Roles: {}", roles.len());
    tracing::info!("  Poll interval: {:?}", config.poll_interval);
    tracing::info!("  Confirmations: {}", config.confirmations);

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let poll = PollLoop::new(
        origin,
        Arc::new(registry),
        Reconciler::new(roles),
        StoreGateway::new(pool),
        config.poll_config(),
    )
    .with_running(running);

    let stats = tokio::spawn(poll.run())
        .await
        .context("Poll loop task panicked")?;

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Batches committed:    {}", stats.batches_committed);
    tracing::info!("Batches rolled back:  {}", stats.batches_failed);
    tracing::info!("Fetch failures:       {}", stats.fetch_failures);
    tracing::info!("Entries projected:    {}", stats.entries.projected);
    tracing::info!("Entries replayed:     {}", stats.entries.replayed);
    tracing::info!("Decode failures:      {}", stats.entries.decode_failures);

    Ok(())
}
