//! Node-scoped polling/reporting endpoints the node manager drives (§4.4,
//! §4.5, §4.6). Every handler here matches a method on
//! `apps/node-agent/src/gateway_client.rs::GatewayClient` exactly — URL,
//! verb, and wire shape.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};

use af_domain::{Node, NodeCapacity, NodeStatus, RunStatus};
use af_protocol::{HeartbeatRequest, HeartbeatResponse};
use af_store::HeartbeatRecord;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{auth_task_wire, instance_wire, run_snapshot, terminal_wire};

/// `POST /api/v1/nodes/heartbeat` — every 10s; TTL is 3x the period (§4.1).
const HEARTBEAT_TTL_SECS: i64 = 30;

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    state.store.upsert_node({
        let mut node = state
            .store
            .get_node(&req.node_id)
            .unwrap_or_else(|| Node::new(req.node_id.clone()));
        node.status = NodeStatus::Online;
        node.labels = req.labels.clone().into_iter().collect();
        node.capacity = NodeCapacity {
            max_concurrent: Some(req.capacity.max_concurrent),
            extra: Default::default(),
        };
        node.last_heartbeat = Utc::now();
        node
    });

    state.liveness.put_heartbeat(
        HeartbeatRecord {
            node_id: req.node_id.clone(),
            labels: req.labels,
            max_concurrent: req.capacity.max_concurrent,
            available: req.capacity.available,
            running_runs: req.running_runs.clone(),
            last_seen: Utc::now(),
        },
        Duration::seconds(HEARTBEAT_TTL_SECS),
    );

    let cancel_ids = state
        .pending_cancels
        .outstanding_for(req.running_runs.iter().map(String::as_str));

    Json(HeartbeatResponse::ok().with_cancel_runs(cancel_ids))
}

/// `GET /api/v1/nodes/{id}/runs` — runs currently bound to this node (§4.5
/// step 1).
pub async fn runs_for_node(State(state): State<AppState>, Path(node_id): Path<String>) -> impl IntoResponse {
    let snapshots: Vec<_> = state
        .store
        .list_runs_for_node(&node_id)
        .into_iter()
        .filter(|r| r.status == RunStatus::Running)
        .map(|r| run_snapshot(&state.store, &r))
        .collect();
    Json(snapshots)
}

/// `GET /api/v1/nodes/{id}/instances` — same pattern as runs, for the
/// instance reconciler (§4.4).
pub async fn instances_for_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> impl IntoResponse {
    let instances: Vec<_> = state
        .store
        .list_instances_for_node(&node_id)
        .iter()
        .map(instance_wire)
        .collect();
    Json(instances)
}

/// `GET /api/v1/nodes/{id}/auth-tasks` — pending AuthSessions for this node
/// (§4.4 OAuth driver).
pub async fn auth_tasks_for_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> impl IntoResponse {
    let tasks: Vec<_> = state
        .liveness
        .list_auth_sessions_for_node(&node_id)
        .into_iter()
        .filter(|s| !s.status.is_terminal())
        .map(|s| {
            let agent_type_id = state
                .store
                .get_account(&s.account_id)
                .map(|a| a.agent_type_id)
                .unwrap_or_default();
            auth_task_wire(&s, agent_type_id)
        })
        .collect();
    Json(tasks)
}

/// `PATCH /api/v1/auth-tasks/{id}` — driver progress reports (§4.4 steps
/// 3-5). The liveness store holds the canonical AuthSession; on success
/// this also flips the account to `authenticated`.
pub async fn patch_auth_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(patch): Json<af_protocol::AuthTaskPatch>,
) -> ApiResult<impl IntoResponse> {
    let mut session = state
        .liveness
        .get_auth_session(&task_id)
        .ok_or_else(|| ApiError::not_found("auth_task", &task_id))?;

    if let Some(status) = patch.status.as_deref() {
        session.status = crate::wire::status_from_str(status)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown auth session status \"{status}\"")))?;
    }
    if let Some(executed) = patch.executed {
        session.executed = executed;
    }
    if let Some(url) = patch.oauth_url {
        session.oauth_url = Some(url);
    }
    if let Some(code) = patch.user_code {
        session.user_code = Some(code);
    }
    if let Some(message) = patch.message {
        session.message = Some(message);
    }

    let account_id = session.account_id.clone();
    state.liveness.put_auth_session(session.clone());

    if session.status == af_domain::AuthSessionStatus::Success {
        if let Some(volume_name) = patch.volume_name {
            state.store.update_account(&account_id, |a| {
                a.mark_authenticated(volume_name);
            });
        }
    }

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /api/v1/nodes/{id}/terminal-sessions` — mirrors the instance
/// reconciler pattern (§4.4).
pub async fn terminal_sessions_for_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> impl IntoResponse {
    let sessions: Vec<_> = state
        .store
        .list_terminal_sessions_for_node(&node_id)
        .iter()
        .map(terminal_wire)
        .collect();
    Json(sessions)
}
