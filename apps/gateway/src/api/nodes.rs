//! `/api/v1/nodes` resource reads (§3, §4.1). Nodes are upserted by
//! `POST /api/v1/nodes/heartbeat` (see `node_facing.rs`), not by a generic
//! `POST /api/v1/nodes` — there is no client-supplied node record
//! independent of a heartbeat, and no delete: a node simply ages out of
//! `online_node_ids()` once its heartbeats stop (§4.1).

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::node_json;

pub async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    let online = state.liveness.online_node_ids();
    let nodes: Vec<Value> = state
        .store
        .list_nodes()
        .iter()
        .map(|n| {
            let mut v = node_json(n);
            v["online"] = Value::Bool(online.contains(&n.id));
            v
        })
        .collect();
    Json(serde_json::json!({ "nodes": nodes }))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let node = state
        .store
        .get_node(&id)
        .ok_or_else(|| ApiError::not_found("node", &id))?;
    let mut v = node_json(&node);
    v["online"] = Value::Bool(state.liveness.online_node_ids().contains(&id));
    Ok(Json(v))
}
