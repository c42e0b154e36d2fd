//! `/api/v1/runs` — list/get/patch, cancellation, and the event log (§6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use af_domain::{CanonicalEventType, Event, RunStatus};
use af_protocol::{EventBatchRequest, EventWire, RunPatch};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{run_json, status_from_str, status_to_string};

pub async fn list_runs(State(state): State<AppState>) -> impl IntoResponse {
    let runs: Vec<Value> = state.store.list_runs().iter().map(run_json).collect();
    Json(serde_json::json!({ "runs": runs }))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run = state
        .store
        .get_run(&id)
        .ok_or_else(|| ApiError::not_found("run", &id))?;
    Ok(Json(run_json(&run)))
}

/// `PATCH /api/v1/runs/{id}` — `{status, node_id?}` (§6). This is also the
/// endpoint the node manager hits to report terminal status (§4.5 step 6).
pub async fn patch_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<RunPatch>,
) -> ApiResult<impl IntoResponse> {
    let status: Option<RunStatus> = patch
        .status
        .as_deref()
        .map(|s| {
            status_from_str(s).ok_or_else(|| ApiError::BadRequest(format!("unknown run status \"{s}\"")))
        })
        .transpose()?;

    let run = state
        .store
        .update_run(&id, |r| {
            if let Some(status) = status {
                if status.is_terminal() {
                    r.finish(status, patch.error.clone());
                } else {
                    r.status = status;
                }
            }
            if let Some(node_id) = patch.node_id.clone() {
                r.node_id = Some(node_id);
            }
        })
        .ok_or_else(|| ApiError::not_found("run", &id))?;

    state.store.propagate_task_status(&run.task_id, run.status);
    if run.status.is_terminal() {
        state.pending_cancels.clear(&run.id);
    }
    Ok(Json(run_json(&run)))
}

/// `POST /api/v1/runs/{id}/cancel` — only from `{queued, running}` (§6).
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run = state
        .store
        .get_run(&id)
        .ok_or_else(|| ApiError::not_found("run", &id))?;

    match run.status {
        RunStatus::Queued => {
            let run = state
                .store
                .update_run(&id, |r| r.finish(RunStatus::Cancelled, None))
                .expect("run exists");
            state.store.propagate_task_status(&run.task_id, run.status);
            Ok(Json(run_json(&run)))
        }
        RunStatus::Running => {
            // The node learns about this via its next heartbeat response
            // (§4.5, §8 scenario 6); the run stays `running` until it
            // reports back.
            state.pending_cancels.request(&id);
            Ok(Json(run_json(&run)))
        }
        other => Err(ApiError::Conflict(format!(
            "run {id} cannot be cancelled from status {}",
            status_to_string(&other)
        ))),
    }
}

/// `POST /api/v1/runs/{id}/events` — batch ingest, idempotent by `(run_id,
/// seq)` (§4.5 step 5, §8 round-trip law). Newly appended events are
/// published to the live event stream for tailing clients.
pub async fn post_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EventBatchRequest>,
) -> ApiResult<impl IntoResponse> {
    if state.store.get_run(&id).is_none() {
        return Err(ApiError::not_found("run", &id));
    }

    let mut events = Vec::with_capacity(body.events.len());
    for wire in body.events {
        let event_type: CanonicalEventType = status_from_str(&wire.event_type).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown event type \"{}\"", wire.event_type))
        })?;
        let mut event = Event::new(id.clone(), wire.seq, event_type, wire.payload);
        event.timestamp = wire.timestamp;
        if let Some(raw) = wire.raw {
            event = event.with_raw(raw);
        }
        events.push(event);
    }

    let appended = state.store.append_events(&id, events);
    for event in &appended {
        state.events.publish(event.clone());
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "appended": appended.len() })),
    ))
}

#[derive(Debug, serde::Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from_seq: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /api/v1/runs/{id}/events?from_seq=&limit=` — paged tail (§6).
pub async fn get_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    if state.store.get_run(&id).is_none() {
        return Err(ApiError::not_found("run", &id));
    }
    let from_seq = query.from_seq.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let events: Vec<EventWire> = state
        .store
        .events_after(&id, from_seq, limit)
        .into_iter()
        .map(|e| EventWire {
            seq: e.seq,
            event_type: status_to_string(&e.event_type),
            timestamp: e.timestamp,
            payload: e.payload,
            raw: e.raw,
        })
        .collect();
    Ok(Json(serde_json::json!({ "events": events })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use af_domain::{Run, Task, TaskSpec};

    fn new_run(state: &AppState) -> af_domain::Run {
        let spec = TaskSpec { prompt: "p".into(), workspace: None, security: Default::default(), agent: Default::default() };
        let task = state.store.create_task(Task::new("t".into(), spec));
        state.store.create_run(Run::new(task.id, task.spec))
    }

    #[tokio::test]
    async fn patch_run_to_terminal_status_propagates_and_clears_pending_cancel() {
        let (_dir, state) = test_state();
        let run = new_run(&state);
        state.pending_cancels.request(&run.id);

        let patched = patch_run(
            State(state.clone()),
            Path(run.id.clone()),
            Json(RunPatch { status: Some("done".into()), node_id: None, error: None }),
        )
        .await
        .expect("patch ok");
        let _ = patched;

        let stored = state.store.get_run(&run.id).unwrap();
        assert_eq!(stored.status, RunStatus::Done);
        assert!(stored.finished_at.is_some());
        assert!(state.pending_cancels.outstanding_for(std::iter::once(run.id.as_str())).is_empty());
    }

    #[tokio::test]
    async fn cancel_queued_run_finishes_immediately() {
        let (_dir, state) = test_state();
        let run = new_run(&state);

        let response = cancel_run(State(state.clone()), Path(run.id.clone())).await;
        assert!(response.is_ok());
        assert_eq!(state.store.get_run(&run.id).unwrap().status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_running_run_only_records_pending_cancel() {
        let (_dir, state) = test_state();
        let run = new_run(&state);
        state.store.update_run(&run.id, |r| r.start_on("node-1".into()));

        let response = cancel_run(State(state.clone()), Path(run.id.clone())).await;
        assert!(response.is_ok());

        let stored = state.store.get_run(&run.id).unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert_eq!(
            state.pending_cancels.outstanding_for(std::iter::once(run.id.as_str())),
            vec![run.id.clone()]
        );
    }

    #[tokio::test]
    async fn event_ingest_is_idempotent_and_publishes() {
        let (_dir, state) = test_state();
        let run = new_run(&state);
        let mut rx = state.events.subscribe(&run.id);

        let wire = EventWire {
            seq: 1,
            event_type: "message".into(),
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({"text": "hi"}),
            raw: None,
        };
        let batch = EventBatchRequest { events: vec![wire.clone()] };

        let first = post_events(State(state.clone()), Path(run.id.clone()), Json(batch.clone()))
            .await
            .expect("first ingest ok");
        let _ = first;
        let second = post_events(State(state.clone()), Path(run.id.clone()), Json(batch))
            .await
            .expect("second ingest ok");
        let _ = second;

        assert_eq!(state.store.events_after(&run.id, 0, 10).len(), 1);
        let received = rx.try_recv().expect("event published");
        assert_eq!(received.seq, 1);
    }
}
