//! Resilient Payment Gateway
//!
//! An HTTP front for an unreliable payment provider, built with Tokio and
//! Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                 PAYMENT GATEWAY                  │
//!                      │                                                  │
//!   POST /pay          │  ┌────────┐   ┌─────────┐   ┌───────────────┐    │
//!   ───────────────────┼─▶│  http  │──▶│ breaker │──▶│ retry/backoff │────┼──▶ Provider
//!                      │  │ server │   │  gate   │   └───────┬───────┘    │
//!                      │  └────────┘   └─────────┘           │            │
//!                      │       ▲                             ▼            │
//!   GET /status        │       │       ┌──────────────────────────────┐   │
//!   GET /metrics       │       └───────│ breaker · ledger · metrics   │   │
//!   GET /status/summary│               │ (one lock, one outcome/req)  │   │
//!                      │               └──────────────┬───────────────┘   │
//!                      │                              ▼                   │
//!                      │                     snapshot writer (JSON)       │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use payment_gateway::config::{load_config, GatewayConfig};
use payment_gateway::http::HttpServer;
use payment_gateway::lifecycle::{wait_for_signal, Shutdown};
use payment_gateway::observability::{logging, metrics};
use payment_gateway::payments::{load_snapshot, PaymentGateway, SimulatedProvider, SnapshotWriter};
use payment_gateway::resilience::SystemClock;

#[derive(Parser)]
#[command(name = "payment-gateway", version, about = "Resilient payment gateway")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = GatewayConfig::default();
            if let Some(port) = port_from_env() {
                config.listener.set_port(port);
            }
            config
        }
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("payment-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        failure_threshold = config.breaker.failure_threshold,
        cooldown_ms = config.breaker.cooldown_ms,
        max_attempts = config.retries.max_attempts,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let gateway = Arc::new(build_gateway(&config));
    let shutdown = Shutdown::new();

    let writer = config.persistence.enabled.then(|| {
        let writer = SnapshotWriter::new(gateway.clone(), &config.persistence);
        tokio::spawn(writer.run(shutdown.subscribe()))
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, gateway);
    let server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    server.await??;
    if let Some(writer) = writer {
        writer.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_gateway(config: &GatewayConfig) -> PaymentGateway {
    let provider = Arc::new(SimulatedProvider::from_config(&config.provider));

    let snapshot = if config.persistence.enabled {
        load_snapshot(Path::new(&config.persistence.path))
    } else {
        None
    };

    match snapshot {
        Some(snapshot) => PaymentGateway::restore(config, provider, Arc::new(SystemClock), snapshot),
        None => PaymentGateway::new(config, provider),
    }
}

fn port_from_env() -> Option<u16> {
    let raw = std::env::var("PORT").ok()?;
    match raw.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            eprintln!("Ignoring invalid PORT value {raw:?}");
            None
        }
    }
}
