//! Node manager binary (§4.5–§4.6): polls for run assignments, heartbeats,
//! and reconciles instances/terminal sessions/auth tasks against the local
//! container runtime.

mod adapter_bridge;
mod gateway_client;
mod heartbeat;
mod ip_discovery;
mod reconcile;
mod run_executor;
mod state;
mod workspace;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use af_adapters::AdapterRegistry;
use af_container_rt::ContainerRuntime;
use af_domain::Config;
use clap::Parser;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::gateway_client::GatewayClient;
use crate::state::NodeState;

#[derive(Parser, Debug)]
#[command(name = "af-node-agent", about = "Fleet node manager")]
struct Cli {
    /// Path to the node config YAML (falls back to ./configs/af.yaml then env vars).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let issues = config.validate();
    for issue in &issues {
        tracing::warn!(%issue, "config issue");
    }
    if Config::has_fatal_issues(&issues) {
        anyhow::bail!("node config has fatal issues, refusing to start");
    }

    tracing::info!(node_id = %config.node.id, "starting node manager");

    let gateway = GatewayClient::new(config.server.api_url.clone(), config.node.shared_token.clone());
    let runtime = ContainerRuntime::default();
    let adapters = AdapterRegistry::with_builtin_adapters();
    let shutdown = CancellationToken::new();

    let state = NodeState {
        config: Arc::new(config),
        gateway: Arc::new(gateway),
        runtime: Arc::new(runtime),
        adapters: Arc::new(adapters),
        running: Arc::new(Mutex::new(HashMap::new())),
        terminal_ports: Arc::new(Mutex::new(HashSet::new())),
        shutdown: shutdown.clone(),
    };

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(heartbeat::run(state.clone()));
    tasks.spawn(run_executor::run(state.clone()));
    tasks.spawn(reconcile::instance::run(state.clone()));
    tasks.spawn(reconcile::terminal::run(state.clone()));
    tasks.spawn(reconcile::auth_session::run(state.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    while tasks.join_next().await.is_some() {}
    Ok(())
}
