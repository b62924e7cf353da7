use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Snapshot of live collaboration state and host resources
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_conn: u32,
    pub n_projects: u32,
    pub n_rooms: u32,
    pub n_pending_saves: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
