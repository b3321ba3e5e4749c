//! Placement server
//!
//! Ranks the fleet's devices for workloads posted to `/mf2c/optimal`,
//! using the device registry as the source of truth.

use anyhow::Result;
use placement_lib::{
    health::{components, HealthRegistry},
    observability::{PlacementMetrics, ServiceLogger},
    CimiClient, OptimalFilter, WorkloadHistory,
};
use placement_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load()?;
    let logger = ServiceLogger::new(&config.instance_name);
    logger.log_startup(SERVER_VERSION, &config.registry_endpoint);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::DEVICE_SOURCE).await;

    let source = CimiClient::new(&config.registry())?;
    let filter = OptimalFilter::new(Arc::new(source), config.filter_options());
    let history = WorkloadHistory::new(config.history_capacity);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        PlacementMetrics::new(),
        filter,
        history,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server stopped"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server exited");
        }
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
