use axum::Json;
use crate::models::HealthResponse;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Collaboration server is running".to_string(),
    })
}

/// Readiness check endpoint
pub async fn ready_check() -> Json<HealthResponse> {
    debug!("Readiness check requested");
    // The engine has no hard dependencies at startup; the project store
    // is consulted lazily and failures there are non-fatal.
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Ready to accept connections".to_string(),
    })
}
