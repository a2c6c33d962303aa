mod api;
mod errors;
mod middleware;
mod state;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use spot_core::config::AppConfig;
use state::AppState;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    spot_core::logging::init("spot-server", &config.logging);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    info!("starting control plane server");
    let state = Arc::new(AppState::new(config.clone(), metrics_handle).await?);
    info!("application state initialized");

    let (_shutdown, _scheduler_handles) = spot_scheduler::spawn_all(
        state.pricing.clone(),
        Arc::new(spot_providers::StaticPriceProvider::default()),
        Vec::new(),
        state.risk.clone(),
        state.coordinator.clone(),
    );

    let app = api::build_api_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
