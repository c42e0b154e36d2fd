pub mod accounts;
pub mod auth;
pub mod error;
pub mod events_ws;
pub mod health;
pub mod instances;
pub mod node_facing;
pub mod nodes;
pub mod proxies;
pub mod runs;
pub mod tasks;
pub mod terminal_sessions;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (health/metrics/monitor), **node-facing**
/// (gated behind `X-Node-Token`, matching exactly what
/// `apps/node-agent/src/gateway_client.rs` calls), and the generic
/// resource-CRUD surface (§6). The Non-goals explicitly reduce
/// authorization to the per-node shared token, so resource CRUD is left
/// open to any caller that can reach the gateway.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/ws/monitor", get(events_ws::monitor_ws))
        .route("/ws/runs/:id/events", get(events_ws::run_events_ws));

    let node_facing = Router::new()
        .route("/api/v1/nodes/heartbeat", post(node_facing::heartbeat))
        .route("/api/v1/nodes/:id/runs", get(node_facing::runs_for_node))
        .route("/api/v1/nodes/:id/instances", get(node_facing::instances_for_node))
        .route("/api/v1/nodes/:id/auth-tasks", get(node_facing::auth_tasks_for_node))
        .route("/api/v1/auth-tasks/:id", patch(node_facing::patch_auth_task))
        .route(
            "/api/v1/nodes/:id/terminal-sessions",
            get(node_facing::terminal_sessions_for_node),
        )
        .route("/api/v1/runs/:id", patch(runs::patch_run))
        .route("/api/v1/runs/:id/events", post(runs::post_events))
        .route("/api/v1/instances/:id", patch(instances::patch_instance))
        .route(
            "/api/v1/terminal-sessions/:id",
            patch(terminal_sessions::patch_terminal_session),
        )
        .route_layer(middleware::from_fn_with_state(state, auth::require_node_token));

    let resources = Router::new()
        .route("/api/v1/tasks", post(tasks::create_task))
        .route("/api/v1/tasks", get(tasks::list_tasks))
        .route("/api/v1/tasks/:id", get(tasks::get_task))
        .route("/api/v1/tasks/:id", patch(tasks::patch_task))
        .route("/api/v1/tasks/:id", axum::routing::delete(tasks::delete_task))
        .route("/api/v1/tasks/:id/runs", post(tasks::create_run_for_task))
        .route("/api/v1/runs", get(runs::list_runs))
        .route("/api/v1/runs/:id", get(runs::get_run))
        .route("/api/v1/runs/:id/cancel", post(runs::cancel_run))
        .route("/api/v1/runs/:id/events", get(runs::get_events))
        .route("/api/v1/nodes", get(nodes::list_nodes))
        .route("/api/v1/nodes/:id", get(nodes::get_node))
        .route("/api/v1/accounts", post(accounts::create_account))
        .route("/api/v1/accounts", get(accounts::list_accounts))
        .route("/api/v1/accounts/:id", get(accounts::get_account))
        .route("/api/v1/accounts/:id", patch(accounts::patch_account))
        .route("/api/v1/accounts/:id", axum::routing::delete(accounts::delete_account))
        .route("/api/v1/accounts/:id/auth", post(accounts::create_auth_session))
        .route("/api/v1/accounts/:id/auth/status", get(accounts::auth_status))
        .route("/api/v1/instances", post(instances::create_instance))
        .route("/api/v1/instances", get(instances::list_instances))
        .route("/api/v1/instances/:id", get(instances::get_instance))
        .route("/api/v1/instances/:id", axum::routing::delete(instances::delete_instance))
        .route("/api/v1/terminal-sessions", post(terminal_sessions::create_terminal_session))
        .route("/api/v1/terminal-sessions", get(terminal_sessions::list_terminal_sessions))
        .route("/api/v1/terminal-sessions/:id", get(terminal_sessions::get_terminal_session))
        .route("/api/v1/proxies", post(proxies::create_proxy))
        .route("/api/v1/proxies", get(proxies::list_proxies))
        .route("/api/v1/proxies/:id", axum::routing::delete(proxies::delete_proxy));

    public
        .merge(node_facing)
        .merge(resources)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
