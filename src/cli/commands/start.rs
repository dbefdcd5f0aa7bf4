// Start command implementation
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::broker;
use crate::config::GatewayConfig;
use crate::server::gateway::{start_gateway_server, AppState};
use crate::server::metrics::start_metrics_server;
use crate::server::shutdown::{drain_with_timeout, wait_for_signal, ShutdownSignal};

/// Execute the start command - launches the gateway and, if enabled, the
/// metrics server, then runs until SIGINT/SIGTERM.
pub async fn execute(config: GatewayConfig) -> Result<()> {
    info!("Starting pubsub-gateway");
    info!("Gateway address: {}", config.server_address());
    if config.metrics.enabled {
        info!("Metrics port: {}", config.metrics.port);
    }

    let broker = broker::connect(&config).context("Failed to initialize broker")?;
    let state = AppState::new(broker, &config);
    let registry = state.registry();

    let shutdown = ShutdownSignal::new();
    let mut handles = Vec::new();

    let gateway_rx = shutdown.subscribe();
    let bind_address = config.server.bind_address.clone();
    let port = config.server.port;
    let mut gateway = tokio::spawn(async move {
        if let Err(e) = start_gateway_server(bind_address, port, state, gateway_rx).await {
            error!("Gateway server error: {}", e);
        }
    });

    if config.metrics.enabled {
        let metrics_rx = shutdown.subscribe();
        let bind_address = config.server.bind_address.clone();
        let port = config.metrics.port;
        handles.push(tokio::spawn(async move {
            if let Err(e) = start_metrics_server(bind_address, port, metrics_rx).await {
                error!("Metrics server error: {}", e);
            }
        }));
    }

    let gateway_exited = tokio::select! {
        _ = wait_for_signal() => false,
        _ = &mut gateway => true,
    };

    info!("Broadcasting shutdown signal to all servers");
    shutdown.shutdown();

    if !gateway_exited {
        handles.push(gateway);
    }
    drain_with_timeout(
        handles,
        Duration::from_secs(config.server.shutdown_timeout_seconds),
    )
    .await;

    // In-flight requests have drained; no subscribe can race this.
    registry.shutdown().await;

    if gateway_exited {
        anyhow::bail!("Gateway server stopped unexpectedly");
    }
    Ok(())
}
