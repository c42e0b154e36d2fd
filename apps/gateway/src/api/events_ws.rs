//! `GET /ws/runs/{id}/events` and `GET /ws/monitor` (§4.7).
//!
//! Both are true bidirectional WebSocket upgrades rather than SSE: the
//! per-run endpoint needs to read the peer's liveness `ping`s, and the
//! monitor channel is a pure broadcast with no per-client request state.
//! Mirrors the writer-task/reader-loop split the node↔gateway tool-dispatch
//! socket uses.

use std::pin::Pin;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, Sleep};

use af_domain::{Event, Run, RunStatus};
use af_protocol::ws::RunStatusUpdate;
use af_protocol::{EventWire, WsMessage};

use crate::state::AppState;
use crate::wire::status_to_string;

const READ_DEADLINE: Duration = Duration::from_secs(60);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const DEGRADED_POLL_INTERVAL: Duration = Duration::from_millis(500);
const REPLAY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct EventsWsQuery {
    #[serde(default)]
    pub from_seq: Option<u64>,
}

pub async fn run_events_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<EventsWsQuery>,
) -> impl IntoResponse {
    let from_seq = query.from_seq.unwrap_or(0);
    ws.on_upgrade(move |socket| handle_run_events(socket, state, run_id, from_seq))
}

pub async fn monitor_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_monitor(socket, state))
}

fn to_event_wire(e: &Event) -> EventWire {
    EventWire {
        seq: e.seq,
        event_type: status_to_string(&e.event_type),
        timestamp: e.timestamp,
        payload: e.payload.clone(),
        raw: e.raw.clone(),
    }
}

fn final_status(run: &Run) -> WsMessage {
    WsMessage::Status {
        data: RunStatusUpdate {
            status: status_to_string(&run.status),
            finished_at: run.finished_at,
        },
    }
}

async fn handle_run_events(socket: WebSocket, state: AppState, run_id: String, from_seq: u64) {
    let (mut sink, stream) = socket.split();
    let mut cursor = from_seq;

    if state.store.get_run(&run_id).is_none() {
        let _ = send_one(&mut sink, &WsMessage::Status {
            data: RunStatusUpdate { status: "not_found".to_string(), finished_at: None },
        })
        .await;
        return;
    }

    // Step 2: replay from the cursor before subscribing.
    if cursor > 0 {
        for event in state.store.events_after(&run_id, cursor, REPLAY_LIMIT) {
            cursor = event.seq;
            if send_one(&mut sink, &WsMessage::Event { data: to_event_wire(&event) })
                .await
                .is_err()
            {
                return;
            }
        }
    }

    // Step 4: already-terminal run needs no live tail at all.
    if let Some(run) = state.store.get_run(&run_id) {
        if run.status.is_terminal() {
            let _ = send_one(&mut sink, &final_status(&run)).await;
            return;
        }
    }

    if state.events.is_available() {
        run_live(sink, stream, state, run_id).await;
    } else {
        run_degraded(sink, stream, state, run_id, cursor).await;
    }
}

async fn send_one(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).expect("WsMessage always serializes");
    sink.send(Message::Text(text)).await
}

fn reset_deadline(deadline: &mut Pin<Box<Sleep>>) {
    deadline.as_mut().reset(Instant::now() + READ_DEADLINE);
}

/// Subscribe to the live event stream and tail it until the run reaches a
/// terminal event or the connection drops (§4.7 steps 3-4).
async fn run_live(
    sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    state: AppState,
    run_id: String,
) {
    let (tx, mut rx) = mpsc::channel::<WsMessage>(64);
    let mut sink = sink;
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_one(&mut sink, &msg).await.is_err() {
                break;
            }
        }
    });

    let mut broadcast_rx = state.events.subscribe(&run_id);
    let mut ping_timer = interval(PING_INTERVAL);
    let mut deadline: Pin<Box<Sleep>> = Box::pin(sleep(READ_DEADLINE));

    loop {
        tokio::select! {
            _ = ping_timer.tick() => {
                if tx.send(WsMessage::Ping).await.is_err() {
                    break;
                }
            }
            _ = &mut deadline => {
                tracing::debug!(run_id = %run_id, "ws read deadline expired");
                break;
            }
            recv = broadcast_rx.recv() => {
                match recv {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        if tx.send(WsMessage::Event { data: to_event_wire(&event) }).await.is_err() {
                            break;
                        }
                        if terminal {
                            if let Some(run) = state.store.get_run(&run_id) {
                                let _ = tx.send(final_status(&run)).await;
                            }
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(run_id = %run_id, skipped, "ws subscriber lagged behind event stream");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        reset_deadline(&mut deadline);
                        if matches!(serde_json::from_str::<WsMessage>(&text), Ok(WsMessage::Ping)) {
                            let _ = tx.send(WsMessage::Pong).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => reset_deadline(&mut deadline),
                    Some(Err(_)) => break,
                }
            }
        }
    }
    drop(tx);
    writer.abort();
}

/// Degraded mode when the event stream is unavailable at connect time
/// (§4.7 step 5): poll the store instead of subscribing, indistinguishable
/// to the client other than latency.
async fn run_degraded(
    sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    state: AppState,
    run_id: String,
    mut cursor: u64,
) {
    let (tx, mut rx) = mpsc::channel::<WsMessage>(64);
    let mut sink = sink;
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_one(&mut sink, &msg).await.is_err() {
                break;
            }
        }
    });

    let mut poll_timer = interval(DEGRADED_POLL_INTERVAL);
    let mut ping_timer = interval(PING_INTERVAL);
    let mut deadline: Pin<Box<Sleep>> = Box::pin(sleep(READ_DEADLINE));

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                let mut broke = false;
                for event in state.store.events_after(&run_id, cursor, REPLAY_LIMIT) {
                    cursor = event.seq;
                    if tx.send(WsMessage::Event { data: to_event_wire(&event) }).await.is_err() {
                        broke = true;
                        break;
                    }
                }
                if broke {
                    break;
                }
                if let Some(run) = state.store.get_run(&run_id) {
                    if run.status.is_terminal() {
                        let _ = tx.send(final_status(&run)).await;
                        break;
                    }
                }
            }
            _ = ping_timer.tick() => {
                if tx.send(WsMessage::Ping).await.is_err() {
                    break;
                }
            }
            _ = &mut deadline => {
                tracing::debug!(run_id = %run_id, "ws read deadline expired");
                break;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        reset_deadline(&mut deadline);
                        if matches!(serde_json::from_str::<WsMessage>(&text), Ok(WsMessage::Ping)) {
                            let _ = tx.send(WsMessage::Pong).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => reset_deadline(&mut deadline),
                    Some(Err(_)) => break,
                }
            }
        }
    }
    drop(tx);
    writer.abort();
}

async fn handle_monitor(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(64);
    let mut sink = sink;
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_one(&mut sink, &msg).await.is_err() {
                break;
            }
        }
    });

    let mut broadcast_timer = interval(Duration::from_secs(3));
    loop {
        tokio::select! {
            _ = broadcast_timer.tick() => {
                let workflows = monitor_workflows(&state);
                let stats = monitor_stats(&state);
                if tx.send(WsMessage::Workflows { data: workflows }).await.is_err() {
                    break;
                }
                if tx.send(WsMessage::Stats { data: stats }).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    drop(tx);
    writer.abort();
}

fn monitor_workflows(state: &AppState) -> serde_json::Value {
    let runs: Vec<_> = state
        .store
        .list_runs_by_status(RunStatus::Running)
        .into_iter()
        .map(|r| serde_json::json!({ "run_id": r.id, "task_id": r.task_id, "node_id": r.node_id }))
        .collect();
    serde_json::json!({ "running": runs })
}

fn monitor_stats(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "queued": state.store.list_runs_by_status(RunStatus::Queued).len(),
        "running": state.store.list_runs_by_status(RunStatus::Running).len(),
        "online_nodes": state.liveness.online_node_ids().len(),
    })
}
