//! §4.4 instance reconciler: drives declared instance state toward real
//! container state.
//!
//! ```text
//! pending  ──create container─▶ creating
//! creating ──container up?────▶ running
//! running  ──container gone?──▶ error
//! stopped  ──start requested─▶ pending
//! running  ──stop requested──▶ stopping
//! stopping ──container down─▶ stopped
//! ```

use std::time::Duration;

use af_container_rt::CreateSpec;
use af_protocol::node_facing::InstancePatch;
use af_protocol::InstanceWire;

use crate::state::NodeState;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const GC_INTERVAL: Duration = Duration::from_secs(30);
pub const ORCHESTRATOR_IMAGE_PREFIX: &str = "af-agents/";

pub async fn run(state: NodeState) {
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut gc = tokio::time::interval(GC_INTERVAL);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = poll.tick() => reconcile_once(&state).await,
            _ = gc.tick() => gc_orphans(&state).await,
        }
    }
}

fn container_name(instance: &InstanceWire) -> String {
    instance
        .container_name
        .clone()
        .unwrap_or_else(|| format!("af-instance-{}", instance.id))
}

async fn reconcile_once(state: &NodeState) {
    let instances = match state.gateway.instances_for_node(state.node_id()).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to poll instances");
            return;
        }
    };

    for instance in instances {
        if let Err(e) = reconcile_instance(state, &instance).await {
            tracing::warn!(instance_id = %instance.id, error = %e, "instance reconcile step failed");
            let _ = state
                .gateway
                .patch_instance(
                    &instance.id,
                    &InstancePatch {
                        status: Some("error".to_string()),
                        container_name: None,
                    },
                )
                .await;
        }
    }
}

async fn reconcile_instance(state: &NodeState, instance: &InstanceWire) -> anyhow::Result<()> {
    let name = container_name(instance);
    let image = format!("{ORCHESTRATOR_IMAGE_PREFIX}{}:latest", instance.agent_type_id);

    match instance.status.as_str() {
        "pending" => {
            let spec = CreateSpec::new(name.clone(), image)
                .with_env("AF_ACCOUNT_ID", &instance.account_id);
            state.runtime.create(&spec).await?;
            state.runtime.start(&name).await?;
            state
                .gateway
                .patch_instance(
                    &instance.id,
                    &InstancePatch {
                        status: Some("creating".to_string()),
                        container_name: Some(name),
                    },
                )
                .await?;
        }
        "creating" => {
            if state.runtime.is_running(&name).await? {
                state
                    .gateway
                    .patch_instance(
                        &instance.id,
                        &InstancePatch {
                            status: Some("running".to_string()),
                            container_name: Some(name),
                        },
                    )
                    .await?;
            }
        }
        "running" => {
            let alive = state.runtime.exists(&name).await? && state.runtime.is_running(&name).await?;
            if !alive {
                state
                    .gateway
                    .patch_instance(
                        &instance.id,
                        &InstancePatch {
                            status: Some("error".to_string()),
                            container_name: None,
                        },
                    )
                    .await?;
            }
        }
        "stopping" => {
            state.runtime.stop(&name).await.ok();
            if !state.runtime.is_running(&name).await? {
                state
                    .gateway
                    .patch_instance(
                        &instance.id,
                        &InstancePatch {
                            status: Some("stopped".to_string()),
                            container_name: None,
                        },
                    )
                    .await?;
            }
        }
        // "stopped" / "error": wait for a user-initiated transition back
        // to "pending" before touching the container again.
        _ => {}
    }
    Ok(())
}

/// §4.4 orphan GC: remove managed containers with no corresponding
/// instance, restricted to images carrying the orchestrator's prefix.
async fn gc_orphans(state: &NodeState) {
    let instances = match state.gateway.instances_for_node(state.node_id()).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "gc: failed to list instances");
            return;
        }
    };
    let known: std::collections::HashSet<String> = instances.iter().map(container_name).collect();

    let managed = match state.runtime.list_managed().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "gc: failed to list managed containers");
            return;
        }
    };

    for name in managed {
        if known.contains(&name) {
            continue;
        }
        match state.runtime.image_of(&name).await {
            Ok(image) if image.starts_with(ORCHESTRATOR_IMAGE_PREFIX) => {
                tracing::info!(container = %name, "removing orphaned managed container");
                if let Err(e) = state.runtime.rm(&name).await {
                    tracing::warn!(container = %name, error = %e, "failed to remove orphan");
                }
            }
            _ => {}
        }
    }
}
