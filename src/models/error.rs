use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for an error
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

/// Failures of the collaboration engine. None of these are fatal to the
/// process; each one affects only the originating connection's view.
#[derive(Debug)]
pub enum SyncError {
    /// Join against an unknown or closed room
    RoomNotFound(String),
    /// The project store rejected or failed a write. Logged, never
    /// surfaced to the user, not retried.
    PersistenceFailure(String),
    /// A runtime failed while executing a run request
    ExecutionFailure(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::RoomNotFound(room_id) => write!(f, "Room not found: {}", room_id),
            SyncError::PersistenceFailure(e) => write!(f, "Failed to persist project: {}", e),
            SyncError::ExecutionFailure(e) => write!(f, "Execution failed: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}
