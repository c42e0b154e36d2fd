//! §4.6 heartbeat loop: POST every 10s, enact any returned directives
//! before the next tick.

use std::time::Duration;

use af_protocol::{HeartbeatCapacity, HeartbeatRequest};

use crate::ip_discovery::discover_physical_ips;
use crate::state::NodeState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run(state: NodeState) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(e) = send_one(&state).await {
            tracing::warn!(error = %e, "heartbeat failed");
        }
    }
}

async fn send_one(state: &NodeState) -> anyhow::Result<()> {
    let ips = discover_physical_ips().await;
    let hostname = hostname_or_unknown();
    let running_runs = state.running_run_ids();
    let max_concurrent = state
        .config
        .node
        .labels
        .get("max_concurrent")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1);
    let available = max_concurrent.saturating_sub(running_runs.len() as u32);

    let req = HeartbeatRequest {
        node_id: state.node_id().to_string(),
        status: "online".to_string(),
        hostname,
        ips,
        labels: state.config.node.labels.clone(),
        running_runs,
        capacity: HeartbeatCapacity {
            max_concurrent,
            available,
        },
    };

    let resp = state.gateway.heartbeat(&req).await?;
    if let Some(directives) = resp.directives {
        if !directives.cancel_runs.is_empty() {
            state.cancel_runs(&directives.cancel_runs);
        }
    }
    Ok(())
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

// Minimal hostname shim: avoids pulling in the `hostname` crate for one
// syscall the standard library already exposes via `uname`.
mod hostname {
    pub fn get() -> std::io::Result<std::ffi::OsString> {
        Ok(std::env::var_os("HOSTNAME").unwrap_or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| std::ffi::OsString::from(s.trim()))
                .unwrap_or_else(|| std::ffi::OsString::from("unknown"))
        }))
    }
}
