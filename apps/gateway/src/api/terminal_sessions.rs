//! `/api/v1/terminal_sessions` resource CRUD (§3, §4.4 terminal reconciler).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use af_domain::TerminalSession;
use af_protocol::TerminalSessionPatch;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{status_from_str, terminal_json};

#[derive(Debug, Deserialize)]
pub struct CreateTerminalSessionRequest {
    pub container_name: String,
    pub node_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

pub async fn create_terminal_session(
    State(state): State<AppState>,
    Json(body): Json<CreateTerminalSessionRequest>,
) -> impl IntoResponse {
    let mut session = TerminalSession::new(body.container_name, body.node_id);
    session.instance_id = body.instance_id;
    let session = state.store.create_terminal_session(session);
    (StatusCode::CREATED, Json(terminal_json(&session)))
}

pub async fn list_terminal_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<Value> = state
        .store
        .list_nodes()
        .iter()
        .flat_map(|n| state.store.list_terminal_sessions_for_node(&n.id))
        .map(|s| terminal_json(&s))
        .collect();
    Json(serde_json::json!({ "terminal_sessions": sessions }))
}

pub async fn get_terminal_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .store
        .get_terminal_session(&id)
        .ok_or_else(|| ApiError::not_found("terminal_session", &id))?;
    Ok(Json(terminal_json(&session)))
}

pub async fn patch_terminal_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TerminalSessionPatch>,
) -> ApiResult<impl IntoResponse> {
    let next_status = patch
        .status
        .as_deref()
        .map(|s| {
            status_from_str(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown terminal status \"{s}\"")))
        })
        .transpose()?;

    let session = state
        .store
        .update_terminal_session(&id, |s| {
            if let Some(next) = next_status {
                s.status = next;
            }
            if let Some(port) = patch.port {
                s.port = Some(port);
            }
            if let Some(url) = patch.url.clone() {
                s.url = Some(url);
            }
        })
        .ok_or_else(|| ApiError::not_found("terminal_session", &id))?;
    Ok(Json(terminal_json(&session)))
}
