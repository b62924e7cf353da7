use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::project::FileTree;

/// Body of a run request submitted over REST. JS- and Python-family
/// files are normally run socket-side; anything else arrives here and is
/// forwarded to the remote execution service.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunProjectRequest {
    pub project_id: String,
    pub code: FileTree,
    pub run_file: String,
    pub room_id: Option<String>,
    pub socket_id: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RunProjectResponse {
    pub status: String,
}

/// Output chunk pushed back by the remote execution service
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunOutputRequest {
    pub room_id: Option<String>,
    pub socket_id: Option<String>,
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub is_start: bool,
}
