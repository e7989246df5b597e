//! # Pickup Gateway - Main Entry Point
//!
//! Loads configuration, initialises logging and metrics, builds the lookup
//! gateway around the reqwest upstream client, and serves HTTP until SIGINT
//! or SIGTERM.

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use pickup_gateway::gateway::{GatewayServer, PickupLookupGateway, ServerState};
use pickup_gateway::observability::{init_tracing, install_prometheus_recorder};
use pickup_gateway::{GatewayConfig, GatewayResult, HttpUpstreamClient};

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialised yet if configuration failed
        eprintln!("Pickup gateway failed: {}", e);
        error!("Pickup gateway failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> GatewayResult<()> {
    let config_path =
        std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = GatewayConfig::load_or_default(&config_path).await?;

    init_tracing(&config.observability.logging);
    info!("🚀 Starting pickup gateway v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, "📋 Configuration loaded and validated");

    let metrics = match install_prometheus_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let upstream = Arc::new(HttpUpstreamClient::new(&config.upstream)?);
    let gateway = Arc::new(PickupLookupGateway::new(&config, upstream));
    let maintenance = gateway.spawn_maintenance();

    info!(
        cache_ttl_ms = config.lookup.cache_ttl_ms,
        rate_limit_enabled = config.lookup.rate_limit_enabled,
        breaker_failure_threshold = config.lookup.breaker_failure_threshold,
        upstream = %config.upstream.base_url,
        "🔧 Lookup gateway ready"
    );

    let mut state = ServerState::new(gateway);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let server = GatewayServer::new(&config.server, state)?;
    let result = server.start(shutdown_signal()).await;

    for task in maintenance {
        task.abort();
    }
    info!("✅ Pickup gateway shutdown complete");
    result
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT, initiating graceful shutdown..."),
        _ = terminate => info!("📡 Received SIGTERM, initiating graceful shutdown..."),
    }
}
