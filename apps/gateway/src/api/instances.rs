//! `/api/v1/instances` resource CRUD (§3, §4.4 instance reconciler).
//! `status`/`container_name` writes normally come from the node reconciler
//! via `PATCH /api/v1/instances/{id}` (shared with `node_facing.rs`); this
//! module additionally exposes the generic list/get/delete surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use af_domain::Instance;
use af_protocol::InstancePatch;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{instance_json, status_from_str};

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub account_id: String,
    pub agent_type_id: String,
    pub node_id: String,
}

pub async fn create_instance(
    State(state): State<AppState>,
    Json(body): Json<CreateInstanceRequest>,
) -> impl IntoResponse {
    let instance = state.store.create_instance(Instance::new(
        body.account_id,
        body.agent_type_id,
        body.node_id,
    ));
    (StatusCode::CREATED, Json(instance_json(&instance)))
}

pub async fn list_instances(State(state): State<AppState>) -> impl IntoResponse {
    let instances: Vec<Value> = state.store.list_instances().iter().map(instance_json).collect();
    Json(serde_json::json!({ "instances": instances }))
}

pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let instance = state
        .store
        .get_instance(&id)
        .ok_or_else(|| ApiError::not_found("instance", &id))?;
    Ok(Json(instance_json(&instance)))
}

/// `PATCH /api/v1/instances/{id}` — the reconciler only ever writes
/// `status`/`container_name` (§4.4); illegal transitions are rejected.
pub async fn patch_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<InstancePatch>,
) -> ApiResult<impl IntoResponse> {
    let next_status = patch
        .status
        .as_deref()
        .map(|s| {
            status_from_str(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown instance status \"{s}\"")))
        })
        .transpose()?;

    if let Some(next) = next_status {
        let current = state
            .store
            .get_instance(&id)
            .ok_or_else(|| ApiError::not_found("instance", &id))?;
        if !current.status.can_transition_to(next) {
            return Err(ApiError::Conflict(format!(
                "instance {id} cannot move from {:?} to {:?}",
                current.status, next
            )));
        }
    }

    let instance = state
        .store
        .update_instance(&id, |i| {
            if let Some(next) = next_status {
                i.status = next;
            }
            if let Some(container_name) = patch.container_name.clone() {
                i.container_name = Some(container_name);
            }
        })
        .ok_or_else(|| ApiError::not_found("instance", &id))?;
    Ok(Json(instance_json(&instance)))
}

pub async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if state.store.delete_instance(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("instance", &id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn legal_transition_is_accepted() {
        let (_dir, state) = test_state();
        let instance = state
            .store
            .create_instance(Instance::new("acc-1".into(), "claude-code".into(), "node-1".into()));
        assert_eq!(instance.status, af_domain::InstanceStatus::Pending);

        let patched = patch_instance(
            State(state.clone()),
            Path(instance.id.clone()),
            Json(InstancePatch { status: Some("creating".into()), container_name: None }),
        )
        .await
        .expect("legal transition");
        let _ = patched;
        assert_eq!(state.store.get_instance(&instance.id).unwrap().status, af_domain::InstanceStatus::Creating);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_with_conflict() {
        let (_dir, state) = test_state();
        let instance = state
            .store
            .create_instance(Instance::new("acc-1".into(), "claude-code".into(), "node-1".into()));

        let result = patch_instance(
            State(state.clone()),
            Path(instance.id.clone()),
            Json(InstancePatch { status: Some("running".into()), container_name: None }),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(state.store.get_instance(&instance.id).unwrap().status, af_domain::InstanceStatus::Pending);
    }
}
