use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub database: bool,
}

pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Json<ReadinessStatus> {
    let database = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    Json(ReadinessStatus {
        ready: database,
        database,
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
