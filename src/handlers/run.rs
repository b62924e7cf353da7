use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json};
use tracing::debug;

use crate::AppState;
use crate::models::{
    ErrorResponse, OutputChunk, RunOutputRequest, RunProjectRequest, RunProjectResponse,
    is_valid_tree_path,
};

/// Trigger a run. JS- and Python-family entries execute locally; other
/// extensions are forwarded to the remote execution service. Output
/// streams back to the room (or requester) as `project-output` events.
pub async fn run_project(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<RunProjectRequest>,
) -> Result<(StatusCode, Json<RunProjectResponse>), (StatusCode, Json<ErrorResponse>)> {
    if !is_valid_tree_path(&req.run_file) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: 400,
                status: "Bad Request".to_string(),
                error: format!("Invalid run file: {}", req.run_file),
            }),
        ));
    }
    app_state.dispatcher.dispatch(req);
    Ok((
        StatusCode::ACCEPTED,
        Json(RunProjectResponse { status: "dispatched".to_string() }),
    ))
}

/// Ingest for output chunks pushed back by the remote execution service
pub async fn run_output(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<RunOutputRequest>,
) -> StatusCode {
    debug!(
        "Execution service pushed {} bytes (room: {:?}, socket: {:?})",
        req.output.len(),
        req.room_id,
        req.socket_id
    );
    app_state
        .broadcaster
        .deliver_output(
            req.room_id.as_deref(),
            req.socket_id.as_deref(),
            OutputChunk { output: req.output, is_error: req.is_error, is_start: req.is_start },
        )
        .await;
    StatusCode::NO_CONTENT
}
