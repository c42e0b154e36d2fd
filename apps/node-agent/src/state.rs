use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use af_adapters::AdapterRegistry;
use af_container_rt::ContainerRuntime;
use af_domain::Config;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::gateway_client::GatewayClient;

/// Shared node-manager state (§4.5 "the node maintains a map `running:
/// run_id → cancel`"). One process per node; every loop holds an `Arc`.
#[derive(Clone)]
pub struct NodeState {
    pub config: Arc<Config>,
    pub gateway: Arc<GatewayClient>,
    pub runtime: Arc<ContainerRuntime>,
    pub adapters: Arc<AdapterRegistry>,
    pub running: Arc<Mutex<HashMap<String, CancellationToken>>>,
    /// Ports handed out to ttyd sidecars by the terminal reconciler
    /// (§4.4), tracked so concurrent sessions never collide.
    pub terminal_ports: Arc<Mutex<HashSet<u16>>>,
    pub shutdown: CancellationToken,
}

impl NodeState {
    pub fn node_id(&self) -> &str {
        &self.config.node.id
    }

    /// Dedup-rejects a run already in the running map (§4.8 "duplicate run
    /// assignment on same node").
    pub fn try_claim_run(&self, run_id: &str) -> Option<CancellationToken> {
        let mut guard = self.running.lock();
        if guard.contains_key(run_id) {
            return None;
        }
        let token = self.shutdown.child_token();
        guard.insert(run_id.to_string(), token.clone());
        Some(token)
    }

    pub fn release_run(&self, run_id: &str) {
        self.running.lock().remove(run_id);
    }

    pub fn running_run_ids(&self) -> Vec<String> {
        self.running.lock().keys().cloned().collect()
    }

    /// Enact a `directives.cancel_runs` list from a heartbeat response
    /// (§4.5, §4.6).
    pub fn cancel_runs(&self, run_ids: &[String]) {
        let guard = self.running.lock();
        for id in run_ids {
            if let Some(token) = guard.get(id) {
                tracing::info!(run_id = %id, "cancelling run via heartbeat directive");
                token.cancel();
            }
        }
    }

    /// Claim the lowest free port in the ttyd sidecar range.
    pub fn allocate_terminal_port(&self) -> Option<u16> {
        let range: std::ops::RangeInclusive<u16> = 18800..=18899;
        let mut guard = self.terminal_ports.lock();
        range.into_iter().find(|&port| guard.insert(port))
    }

    pub fn release_terminal_port(&self, port: u16) {
        self.terminal_ports.lock().remove(&port);
    }
}
