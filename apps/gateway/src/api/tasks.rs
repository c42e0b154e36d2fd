//! `/api/v1/tasks` resource CRUD plus `POST /tasks/{id}/runs` (§3, §4.3, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use af_domain::{Run, Task, TaskSpec};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{run_json, task_json};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub spec: TaskSpec,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    let mut task = Task::new(body.name, body.spec);
    task.parent_id = body.parent_id;
    task.context = body.context;
    task.agent_id = body.agent_id;
    task.template_id = body.template_id;
    let task = state.store.create_task(task);
    (StatusCode::CREATED, Json(task_json(&task)))
}

pub async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let tasks: Vec<Value> = state.store.list_tasks().iter().map(task_json).collect();
    Json(serde_json::json!({ "tasks": tasks }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .store
        .get_task(&id)
        .ok_or_else(|| ApiError::not_found("task", &id))?;
    Ok(Json(task_json(&task)))
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

pub async fn patch_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .store
        .update_task(&id, |t| {
            if let Some(name) = patch.name {
                t.name = name;
            }
            if patch.context.is_some() {
                t.context = patch.context;
            }
        })
        .ok_or_else(|| ApiError::not_found("task", &id))?;
    Ok(Json(task_json(&task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if state.store.delete_task(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("task", &id))
    }
}

/// `POST /api/v1/tasks/{id}/runs` — create a new run with a task-spec
/// snapshot (§4.3: a new run against a completed task is permitted and
/// transitions it back to `running` once the scheduler picks it up).
pub async fn create_run_for_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .store
        .get_task(&id)
        .ok_or_else(|| ApiError::not_found("task", &id))?;
    let run = state.store.create_run(Run::new(task.id, task.spec));
    Ok((StatusCode::CREATED, Json(run_json(&run))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use af_domain::TaskSpec;

    fn spec(prompt: &str) -> TaskSpec {
        TaskSpec {
            prompt: prompt.to_string(),
            workspace: None,
            security: Default::default(),
            agent: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_list_get_patch_delete_round_trip() {
        let (_dir, state) = test_state();

        let created = create_task(
            State(state.clone()),
            Json(CreateTaskRequest {
                name: "build it".into(),
                spec: spec("do the thing"),
                parent_id: None,
                context: None,
                agent_id: None,
                template_id: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(created.status(), StatusCode::CREATED);

        let listed = state.store.list_tasks();
        assert_eq!(listed.len(), 1);
        let id = listed[0].id.clone();

        let fetched = get_task(State(state.clone()), Path(id.clone())).await;
        assert!(fetched.is_ok());

        let patched = patch_task(
            State(state.clone()),
            Path(id.clone()),
            Json(TaskPatch { name: Some("renamed".into()), context: None }),
        )
        .await
        .expect("patch ok");
        let _ = patched;
        assert_eq!(state.store.get_task(&id).unwrap().name, "renamed");

        let deleted = delete_task(State(state.clone()), Path(id.clone())).await;
        assert!(deleted.is_ok());
        assert!(state.store.get_task(&id).is_none());

        let missing = get_task(State(state), Path(id)).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn create_run_for_task_snapshots_current_spec() {
        let (_dir, state) = test_state();
        let task = state.store.create_task(af_domain::Task::new("t".into(), spec("hello")));

        let response = create_run_for_task(State(state.clone()), Path(task.id.clone()))
            .await
            .expect("run created");
        let _ = response;

        let runs = state.store.list_runs_for_task(&task.id);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].snapshot.prompt, "hello");
        assert_eq!(runs[0].status, af_domain::RunStatus::Queued);
    }

    #[tokio::test]
    async fn create_run_for_missing_task_is_404() {
        let (_dir, state) = test_state();
        let result = create_run_for_task(State(state), Path("task-none".into())).await;
        assert!(result.is_err());
    }
}
