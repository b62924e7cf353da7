use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Live collaboration diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current counters and host stats", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Trigger a run of a project file
#[utoipa::path(
    post,
    path = "/api/v1/projects/run",
    request_body = RunProjectRequest,
    responses(
        (status = 202, description = "Run dispatched", body = RunProjectResponse),
        (status = 400, description = "Invalid run file", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn run_project_doc() {}

/// Ingest output pushed back by the remote execution service
#[utoipa::path(
    post,
    path = "/api/v1/projects/run-output",
    request_body = RunOutputRequest,
    responses(
        (status = 204, description = "Chunk routed")
    )
)]
#[allow(dead_code)]
pub async fn run_output_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        run_project_doc,
        run_output_doc,
    ),
    components(
        schemas(
            HealthResponse,
            DiagnosticsResponse,
            RunProjectRequest,
            RunProjectResponse,
            RunOutputRequest,
            ErrorResponse
        )
    ),
    tags(
        (name = "api", description = "Collaboration server API")
    )
)]
pub struct ApiDoc;
