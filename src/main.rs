//! tierwatch daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                           TIERWATCH                              │
//!   │                                                                  │
//!   │  ┌─────────────┐   events   ┌────────────────┐   ┌────────────┐ │
//!   │  │   health    │──────────▶│   failover     │──▶│  registry  │ │
//!   │  │ monitor x N │   (mpsc)   │ controller     │   └────────────┘ │
//!   │  └──────┬──────┘            │ (worker/tier)  │                  │
//!   │         │ probe             └───┬────────┬───┘                  │
//!   │         ▼                       │        │                      │
//!   │   web / app / db VMs            ▼        ▼                      │
//!   │                        ┌─────────────┐ ┌──────────────┐         │
//!   │                        │load_balancer│ │   recovery   │         │
//!   │                        │ pool router │ │  incidents   │         │
//!   │                        └─────────────┘ └──────────────┘         │
//!   │                                                                  │
//!   │  Cross-cutting: config (hot reload) · observability · lifecycle  │
//!   │                 resilience (retry/backoff) · admin API           │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tierwatch::config::load_config;
use tierwatch::health::NetworkProbeClient;
use tierwatch::lifecycle::{self, Shutdown};
use tierwatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "tierwatch")]
#[command(about = "Health-probe driven failover for web, app and db tiers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tierwatch.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "tierwatch starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = lifecycle::build(config, Arc::new(NetworkProbeClient::new()))?;

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(shutdown.clone());
    app.run(&shutdown, Some(&args.config)).await?;
    Ok(())
}
