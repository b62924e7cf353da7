use std::sync::{Arc, Mutex, OnceLock};
use axum::{extract::State, http::StatusCode, Json};
use sysinfo::System;
use tracing::info;

use crate::AppState;
use crate::models::DiagnosticsResponse;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Live collaboration counters plus host resource usage
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {
    let (n_projects, n_conn) = app_state.broadcaster.registry().counts().await;
    let n_rooms = app_state.broadcaster.rooms().count().await;
    let n_pending_saves = app_state.broadcaster.debouncer().pending_count().await;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_rooms
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_projects,
            n_rooms,
            n_pending_saves,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
