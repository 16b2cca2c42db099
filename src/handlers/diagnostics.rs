use crate::{auth::auth::{self, Principal}, models::{DiagnosticsResponse, ErrorResponse}, AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Room, connection and queue counts plus host load
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    auth::ensure_admin(&principal)?;

    let (n_rooms, n_conn) = app_state.registry.stats().await;
    let queue = app_state.gateway.stats();

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
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB, Conn: {}, Rooms: {}, Exec: {} running / {} queued",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        n_conn,
        n_rooms,
        queue.running,
        queue.queued
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_rooms: n_rooms as u32,
            n_conn: n_conn as u32,
            n_exec_running: queue.running as u32,
            n_exec_queued: queue.queued as u32,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
