//! Netpulse agent - network interface health monitor
//!
//! Polls the configured interfaces of one device on a fixed interval,
//! appends every snapshot to the sample store, and serves the agent's own
//! health and metrics over HTTP.

use anyhow::{Context, Result};
use netpulse_lib::{
    create_source,
    health::HealthRegistry,
    observability::{AgentMetrics, StructuredLogger},
    FileSampleStore, MemorySampleStore, PollerBuilder, PollerConfig, SampleStore,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting netpulse-agent");

    let config = config::AgentConfig::load()?;
    let monitor = config.monitor_config()?;
    info!(
        target_address = %monitor.target(),
        interfaces = monitor.interface_indexes.len(),
        poll_interval_secs = monitor.poll_interval.as_secs(),
        synthetic = monitor.use_synthetic_source,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(monitor.target());

    let source = create_source(&monitor);
    let store: Arc<dyn SampleStore> = match &config.store_path {
        Some(path) => Arc::new(
            FileSampleStore::open(path)
                .await
                .context("Failed to open sample store")?,
        ),
        None => {
            info!("No store path configured, keeping samples in memory");
            Arc::new(MemorySampleStore::new())
        }
    };

    logger.log_startup(AGENT_VERSION, source.kind(), monitor.interface_indexes.len());

    let poller = PollerBuilder::new()
        .source(source)
        .store(store)
        .config(PollerConfig::from(&monitor))
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));

    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown.clone()));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");

    health_registry.set_ready(false).await;
    shutdown.cancel();

    match poller_handle.await {
        Ok(cycles) => info!(cycles, "Poll loop stopped"),
        Err(e) => error!(error = %e, "Poll loop task failed"),
    }
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
    }

    info!("Shutdown complete");
    Ok(())
}
