//! circuit-guard service binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http server ──▶ registry ──▶ circuit breaker ──▶ dependency
//!                   │                             │
//!                   ▼                             ▼
//!               admin API                 observer (logs, metrics)
//!
//!     config file ──▶ watcher ──▶ ArcSwap<ServiceConfig>
//!     SIGINT/SIGTERM ──▶ Shutdown ──▶ graceful drain
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use circuit_guard::config::loader::load_config;
use circuit_guard::config::watcher::ConfigWatcher;
use circuit_guard::lifecycle::{wait_for_signal, Shutdown};
use circuit_guard::observability::{logging, metrics};
use circuit_guard::{HttpServer, ServiceConfig};

#[derive(Parser)]
#[command(name = "circuit-guard", version)]
#[command(about = "Dependency gateway guarded by circuit breakers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; built-in defaults when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "circuit-guard starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        dependencies = config.dependencies.len(),
        admin_enabled = config.admin.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    // The watcher must stay alive for the lifetime of the server.
    let (config_updates, _watcher) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => signal_shutdown.trigger(),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
    });

    let server = HttpServer::new(config)?;
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
