//! §4.5 node manager run execution: poll assignments, supervise the agent
//! CLI process, parse stdout into canonical events, report completion.

use std::time::Duration;

use af_container_rt::exec_stream::ExecLine;
use af_domain::CanonicalEventType;
use af_protocol::adapter::RunSpec;
use af_protocol::events::{EventBatchRequest, EventWire};
use af_protocol::node_facing::RunPatch;
use af_protocol::run_snapshot::RunSnapshot;
use chrono::Utc;
use serde_json::json;

use crate::adapter_bridge::{descriptor_for, run_spec_from_snapshot};
use crate::state::NodeState;
use crate::workspace;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const EVENT_BATCH_SIZE: usize = 20;
const EVENT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(state: NodeState) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let runs = match state.gateway.runs_for_node(state.node_id()).await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll node assignments");
                continue;
            }
        };

        for snapshot in runs {
            let Some(token) = state.try_claim_run(&snapshot.run_id) else {
                // §4.8: duplicate run assignment on same node — dedup-reject silently.
                continue;
            };
            let state = state.clone();
            let run_id = snapshot.run_id.clone();
            tokio::spawn(async move {
                execute_run(state.clone(), snapshot, token).await;
                state.release_run(&run_id);
            });
        }
    }
}

async fn execute_run(
    state: NodeState,
    snapshot: RunSnapshot,
    cancel: tokio_util::sync::CancellationToken,
) {
    let run_id = snapshot.run_id.clone();
    if let Err(e) = execute_run_inner(&state, &snapshot, &cancel).await {
        tracing::error!(run_id = %run_id, error = %e, "run execution failed");
        let _ = state
            .gateway
            .patch_run(
                &run_id,
                &RunPatch {
                    status: Some("failed".to_string()),
                    node_id: Some(state.node_id().to_string()),
                    error: Some(e.to_string()),
                },
            )
            .await;
        post_event(
            &state,
            &run_id,
            2,
            CanonicalEventType::RunFailed,
            json!({ "status": "failed", "error": e.to_string() }),
            None,
        )
        .await;
    }
}

async fn execute_run_inner(
    state: &NodeState,
    snapshot: &RunSnapshot,
    cancel: &tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let container_name = snapshot
        .container_name
        .clone()
        .unwrap_or_else(|| legacy_container_name(snapshot));

    let workspace_root = std::path::Path::new(&state.config.node.workspace_root);
    let workspace_summary = workspace::prepare(
        &state.runtime,
        workspace_root,
        &container_name,
        &snapshot.run_id,
        &snapshot.workspace,
    )
    .await?;

    post_event(
        state,
        &snapshot.run_id,
        1,
        CanonicalEventType::RunStarted,
        json!({
            "node_id": state.node_id(),
            "container": container_name,
            "workspace": workspace_summary,
        }),
        None,
    )
    .await;

    let adapter = state.adapters.get(&snapshot.agent.agent_type)?;
    let descriptor = descriptor_for(snapshot);
    adapter.validate(&descriptor)?;
    let run_spec: RunSpec = run_spec_from_snapshot(snapshot);
    let command = adapter.build_command(&run_spec, &descriptor);

    let mut handle = state
        .runtime
        .exec_stream(&container_name, &command.command, &command.args)?;

    let mut seq: u64 = 2;
    let mut pending: Vec<EventWire> = Vec::new();
    let mut flush_interval = tokio::time::interval(EVENT_FLUSH_INTERVAL);
    let mut stderr_buf = String::new();
    let mut saw_error_event = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                handle.kill().await;
                flush(state, &snapshot.run_id, &mut pending).await;
                post_event(state, &snapshot.run_id, seq, CanonicalEventType::RunCompleted,
                    json!({ "status": "cancelled" }), None).await;
                state.gateway.patch_run(&snapshot.run_id, &RunPatch {
                    status: Some("cancelled".to_string()),
                    node_id: Some(state.node_id().to_string()),
                    error: None,
                }).await.ok();
                return Ok(());
            }
            line = handle.lines.recv() => {
                match line {
                    Some(ExecLine::Stdout(raw)) => {
                        if let Some(parsed) = adapter.parse_event(&raw) {
                            if parsed.event_type == CanonicalEventType::Error {
                                saw_error_event = true;
                            }
                            pending.push(EventWire {
                                seq,
                                event_type: canonical_type_wire(parsed.event_type),
                                timestamp: Utc::now(),
                                payload: parsed.payload,
                                raw: Some(raw),
                            });
                            seq += 1;
                            if pending.len() >= EVENT_BATCH_SIZE {
                                flush(state, &snapshot.run_id, &mut pending).await;
                            }
                        }
                    }
                    Some(ExecLine::Stderr(line)) => {
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                    None => break,
                }
            }
            _ = flush_interval.tick() => {
                flush(state, &snapshot.run_id, &mut pending).await;
            }
        }
    }

    flush(state, &snapshot.run_id, &mut pending).await;
    if !stderr_buf.is_empty() {
        tracing::info!(run_id = %snapshot.run_id, stderr = %stderr_buf.trim(), "run stderr (not uploaded)");
    }

    let exit_code = handle.wait().await?;
    let status = match exit_code {
        Some(0) if !saw_error_event => "done",
        Some(_) => "failed",
        None => "cancelled",
    };
    let event_type = if status == "done" {
        CanonicalEventType::RunCompleted
    } else {
        CanonicalEventType::RunFailed
    };

    post_event(
        state,
        &snapshot.run_id,
        seq,
        event_type,
        json!({ "status": status, "exit_code": exit_code }),
        None,
    )
    .await;

    state
        .gateway
        .patch_run(
            &snapshot.run_id,
            &RunPatch {
                status: Some(status.to_string()),
                node_id: Some(state.node_id().to_string()),
                error: None,
            },
        )
        .await?;

    Ok(())
}

/// §4.5 step 2 fallback: legacy lookup by name pattern when only
/// `account_id` is available (no `instance_id`, or the gateway did not
/// resolve a container name).
fn legacy_container_name(snapshot: &RunSnapshot) -> String {
    match (&snapshot.agent.instance_id, &snapshot.agent.account_id) {
        (Some(instance_id), _) => format!("af-instance-{instance_id}"),
        (None, Some(account_id)) => format!("af-account-{account_id}"),
        (None, None) => format!("af-run-{}", snapshot.run_id),
    }
}

async fn flush(state: &NodeState, run_id: &str, pending: &mut Vec<EventWire>) {
    if pending.is_empty() {
        return;
    }
    let batch = EventBatchRequest {
        events: std::mem::take(pending),
    };
    if let Err(e) = state.gateway.post_events(run_id, &batch).await {
        tracing::warn!(run_id = %run_id, error = %e, "failed to upload event batch");
    }
}

async fn post_event(
    state: &NodeState,
    run_id: &str,
    seq: u64,
    event_type: CanonicalEventType,
    payload: serde_json::Value,
    raw: Option<String>,
) {
    let batch = EventBatchRequest {
        events: vec![EventWire {
            seq,
            event_type: canonical_type_wire(event_type),
            timestamp: Utc::now(),
            payload,
            raw,
        }],
    };
    if let Err(e) = state.gateway.post_events(run_id, &batch).await {
        tracing::warn!(run_id = %run_id, error = %e, "failed to upload event");
    }
}

fn canonical_type_wire(t: CanonicalEventType) -> String {
    serde_json::to_value(t)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "message".to_string())
}
