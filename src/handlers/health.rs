use axum::{extract::State, Json};
use crate::models::HealthResponse;
use crate::AppState;
use std::sync::Arc;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint. The service can accept sessions without a
/// runner, so a missing one is reported but does not fail readiness.
pub async fn ready_check(State(app_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Readiness check requested");
    let message = if app_state.config.runner_url.is_some() {
        "Service is ready".to_string()
    } else {
        "Service is ready, no code runner configured".to_string()
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        message,
    })
}
