//! §4.4 terminal reconciler: mirrors the instance reconciler for on-demand
//! terminal sessions — allocates a port in a fixed range, starts a ttyd
//! sidecar inside the target container, and writes back `port`/`url`.
//! Sessions past `expires_at` are closed.

use std::collections::HashMap;
use std::time::Duration;

use af_container_rt::exec_stream::ExecHandle;
use af_protocol::node_facing::TerminalSessionPatch;
use af_protocol::TerminalSessionWire;
use chrono::Utc;

use crate::ip_discovery::discover_physical_ips;
use crate::state::NodeState;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const TTYD_BINARY: &str = "ttyd";

struct LiveSession {
    handle: ExecHandle,
    port: u16,
}

pub async fn run(state: NodeState) {
    let mut live: HashMap<String, LiveSession> = HashMap::new();
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                for (_, session) in live.drain() {
                    session.handle.kill().await;
                    state.release_terminal_port(session.port);
                }
                return;
            }
            _ = interval.tick() => reconcile_once(&state, &mut live).await,
        }
    }
}

async fn reconcile_once(state: &NodeState, live: &mut HashMap<String, LiveSession>) {
    let sessions = match state.gateway.terminal_sessions_for_node(state.node_id()).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to poll terminal sessions");
            return;
        }
    };

    let mut seen = std::collections::HashSet::new();
    for session in &sessions {
        seen.insert(session.id.clone());
        if let Err(e) = reconcile_session(state, session, live).await {
            tracing::warn!(session_id = %session.id, error = %e, "terminal reconcile step failed");
            let _ = state
                .gateway
                .patch_terminal_session(
                    &session.id,
                    &TerminalSessionPatch {
                        status: Some("closed".to_string()),
                        port: None,
                        url: None,
                    },
                )
                .await;
            if let Some(s) = live.remove(&session.id) {
                s.handle.kill().await;
                state.release_terminal_port(s.port);
            }
        }
    }

    // sessions the gateway no longer lists (cascade-deleted or expired
    // server-side) still need their sidecar and port released locally.
    let stale: Vec<String> = live.keys().filter(|id| !seen.contains(*id)).cloned().collect();
    for id in stale {
        if let Some(s) = live.remove(&id) {
            s.handle.kill().await;
            state.release_terminal_port(s.port);
        }
    }
}

async fn reconcile_session(
    state: &NodeState,
    session: &TerminalSessionWire,
    live: &mut HashMap<String, LiveSession>,
) -> anyhow::Result<()> {
    if session.expires_at <= Utc::now() {
        if let Some(s) = live.remove(&session.id) {
            s.handle.kill().await;
            state.release_terminal_port(s.port);
        }
        state
            .gateway
            .patch_terminal_session(
                &session.id,
                &TerminalSessionPatch {
                    status: Some("closed".to_string()),
                    port: None,
                    url: None,
                },
            )
            .await?;
        return Ok(());
    }

    match session.status.as_str() {
        "pending" => {
            if live.contains_key(&session.id) {
                return Ok(());
            }
            let port = state
                .allocate_terminal_port()
                .ok_or_else(|| anyhow::anyhow!("no free terminal ports"))?;
            let args = vec![
                "-p".to_string(),
                port.to_string(),
                "-W".to_string(),
                "bash".to_string(),
            ];
            let handle = match state.runtime.exec_stream(&session.container_name, TTYD_BINARY, &args) {
                Ok(h) => h,
                Err(e) => {
                    state.release_terminal_port(port);
                    return Err(e.into());
                }
            };
            live.insert(session.id.clone(), LiveSession { handle, port });

            let host = discover_physical_ips()
                .await
                .into_iter()
                .next()
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let url = format!("http://{host}:{port}/");
            state
                .gateway
                .patch_terminal_session(
                    &session.id,
                    &TerminalSessionPatch {
                        status: Some("running".to_string()),
                        port: Some(port),
                        url: Some(url),
                    },
                )
                .await?;
        }
        "closing" => {
            if let Some(s) = live.remove(&session.id) {
                s.handle.kill().await;
                state.release_terminal_port(s.port);
            }
            state
                .gateway
                .patch_terminal_session(
                    &session.id,
                    &TerminalSessionPatch {
                        status: Some("closed".to_string()),
                        port: None,
                        url: None,
                    },
                )
                .await?;
        }
        // "running": already reconciled above, nothing to do unless it has
        // died — the poll loop will notice via `handle` closing its stream
        // on the next `reconcile_once` pass if we ever add liveness checks.
        _ => {}
    }
    Ok(())
}
