//! `GET /health` and `GET /metrics` (§6).

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::fmt::Write as _;

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus text exposition format. Hand-rolled: nothing in the
/// dependency stack pulls in a metrics client, and the surface here is
/// small enough that adding one would outweigh the benefit.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let tasks = state.store.list_tasks().len();
    let queued = state
        .store
        .list_runs_by_status(af_domain::RunStatus::Queued)
        .len();
    let running = state
        .store
        .list_runs_by_status(af_domain::RunStatus::Running)
        .len();
    let online_nodes = state.liveness.online_node_ids().len();

    let mut out = String::new();
    let _ = writeln!(out, "# HELP af_tasks_total Total tasks known to the store.");
    let _ = writeln!(out, "# TYPE af_tasks_total gauge");
    let _ = writeln!(out, "af_tasks_total {tasks}");
    let _ = writeln!(out, "# HELP af_runs_queued Runs currently queued.");
    let _ = writeln!(out, "# TYPE af_runs_queued gauge");
    let _ = writeln!(out, "af_runs_queued {queued}");
    let _ = writeln!(out, "# HELP af_runs_running Runs currently running.");
    let _ = writeln!(out, "# TYPE af_runs_running gauge");
    let _ = writeln!(out, "af_runs_running {running}");
    let _ = writeln!(out, "# HELP af_nodes_online Nodes with a live heartbeat.");
    let _ = writeln!(out, "# TYPE af_nodes_online gauge");
    let _ = writeln!(out, "af_nodes_online {online_nodes}");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        out,
    )
}
