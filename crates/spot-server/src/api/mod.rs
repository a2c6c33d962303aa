//! Router assembly: health/readiness/metrics are open, every `/agents`
//! route past registration requires client-token ownership of the
//! `{agent_id}` path segment.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{logging_middleware, require_agent_token};
use crate::AppState;

pub mod agents;
pub mod health;

pub fn build_api_router(state: Arc<AppState>) -> Router {
    let authenticated_agent_routes = Router::new()
        .route("/heartbeat", post(agents::heartbeat))
        .route("/pricing-report", post(agents::pricing_report))
        .route("/commands", get(agents::list_commands))
        .route(
            "/commands/:command_id/executed",
            post(agents::command_executed),
        )
        .route("/rebalance", post(agents::rebalance))
        .route("/termination", post(agents::termination))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_agent_token,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .route("/agents/register", post(agents::register))
        .nest("/agents/:agent_id", authenticated_agent_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
        .with_state(state)
}
