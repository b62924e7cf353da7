use std::sync::Arc;
use axum::{routing::{get, post}, Router};

use crate::AppState;
use crate::handlers::{diagnostics, health_check, ready_check, run_output, run_project};

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/projects/run", post(run_project))
        .route("/v1/projects/run-output", post(run_output))
        .with_state(app_state)
}
