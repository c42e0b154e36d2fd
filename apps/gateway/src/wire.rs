//! Conversions between domain types and the wire DTOs in `af-protocol`.
//!
//! Status enums cross the wire as their `snake_case` string (the same
//! representation `serde` already gives them), so these helpers just ride
//! `serde_json` rather than hand-writing a `Display`/`FromStr` pair per enum.

use af_domain::{Account, Instance, Node, Proxy, Run, Task, TerminalSession};
use af_protocol::run_snapshot::{AgentSpecWire, WorkspaceSpecWire};
use af_protocol::{AuthTaskWire, InstanceWire, RunSnapshot, TerminalSessionWire};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn status_to_string<T: Serialize>(status: &T) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "unknown".to_string(),
    }
}

pub fn status_from_str<T: DeserializeOwned>(s: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

pub fn task_json(task: &Task) -> serde_json::Value {
    serde_json::json!({
        "id": task.id,
        "parent_id": task.parent_id,
        "name": task.name,
        "status": status_to_string(&task.status),
        "spec": task.spec,
        "context": task.context,
        "agent_id": task.agent_id,
        "template_id": task.template_id,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
    })
}

pub fn run_json(run: &Run) -> serde_json::Value {
    serde_json::json!({
        "id": run.id,
        "task_id": run.task_id,
        "status": status_to_string(&run.status),
        "node_id": run.node_id,
        "started_at": run.started_at,
        "finished_at": run.finished_at,
        "snapshot": run.snapshot,
        "error": run.error,
        "created_at": run.created_at,
        "updated_at": run.updated_at,
    })
}

pub fn node_json(node: &Node) -> serde_json::Value {
    serde_json::json!({
        "id": node.id,
        "status": status_to_string(&node.status),
        "labels": node.labels,
        "capacity": node.capacity,
        "last_heartbeat": node.last_heartbeat,
    })
}

pub fn account_json(account: &Account) -> serde_json::Value {
    serde_json::json!({
        "id": account.id,
        "name": account.name,
        "agent_type_id": account.agent_type_id,
        "node_id": account.node_id,
        "volume_name": account.volume_name,
        "status": status_to_string(&account.status),
    })
}

pub fn instance_json(instance: &Instance) -> serde_json::Value {
    serde_json::json!({
        "id": instance.id,
        "account_id": instance.account_id,
        "agent_type_id": instance.agent_type_id,
        "node_id": instance.node_id,
        "container_name": instance.container_name,
        "status": status_to_string(&instance.status),
        "created_at": instance.created_at,
        "updated_at": instance.updated_at,
    })
}

pub fn instance_wire(instance: &Instance) -> InstanceWire {
    InstanceWire {
        id: instance.id.clone(),
        account_id: instance.account_id.clone(),
        agent_type_id: instance.agent_type_id.clone(),
        node_id: instance.node_id.clone(),
        container_name: instance.container_name.clone(),
        status: status_to_string(&instance.status),
    }
}

pub fn terminal_json(session: &TerminalSession) -> serde_json::Value {
    serde_json::json!({
        "id": session.id,
        "instance_id": session.instance_id,
        "container_name": session.container_name,
        "node_id": session.node_id,
        "status": status_to_string(&session.status),
        "port": session.port,
        "url": session.url,
        "expires_at": session.expires_at,
    })
}

pub fn terminal_wire(session: &TerminalSession) -> TerminalSessionWire {
    TerminalSessionWire {
        id: session.id.clone(),
        instance_id: session.instance_id.clone(),
        container_name: session.container_name.clone(),
        node_id: session.node_id.clone(),
        status: status_to_string(&session.status),
        expires_at: session.expires_at,
    }
}

pub fn proxy_json(proxy: &Proxy) -> serde_json::Value {
    serde_json::json!({
        "id": proxy.id,
        "host": proxy.host,
        "port": proxy.port,
        "type": status_to_string(&proxy.proxy_type),
        "username": proxy.username,
        "password": proxy.password,
        "no_proxy": proxy.no_proxy,
        "is_default": proxy.is_default,
    })
}

/// Resolve the container name + image a run's agent spec points at, for
/// embedding in its `RunSnapshot` (§4.5 step 2). Instance wins over account
/// when both are present; absent either, the node performs its own legacy
/// name-pattern lookup.
pub fn resolve_container(
    store: &af_store::ResourceStore,
    instance_id: Option<&str>,
    account_id: Option<&str>,
) -> (Option<String>, Option<String>) {
    if let Some(instance_id) = instance_id {
        if let Some(instance) = store.get_instance(instance_id) {
            let image = format!("af-agents/{}:latest", instance.agent_type_id);
            return (instance.container_name.clone(), Some(image));
        }
    }
    if let Some(account_id) = account_id {
        if let Some(account) = store.get_account(account_id) {
            if let Some(instance) = store
                .list_instances_for_node(&account.node_id)
                .into_iter()
                .find(|i| i.account_id == account_id)
            {
                let image = format!("af-agents/{}:latest", instance.agent_type_id);
                return (instance.container_name.clone(), Some(image));
            }
        }
    }
    (None, None)
}

pub fn run_snapshot(store: &af_store::ResourceStore, run: &Run) -> RunSnapshot {
    let agent = &run.snapshot.agent;
    let parameters = match &agent.parameters {
        Some(serde_json::Value::Object(map)) => map.clone().into_iter().collect(),
        _ => Default::default(),
    };
    let workspace = run.snapshot.workspace.as_ref().map(|w| match w {
        af_domain::task::WorkspaceSpec::Git { url, branch, commit } => WorkspaceSpecWire::Git {
            url: url.clone(),
            branch: branch.clone(),
            commit: commit.clone(),
        },
        af_domain::task::WorkspaceSpec::LocalPath { path } => {
            WorkspaceSpecWire::LocalPath { path: path.clone() }
        }
        af_domain::task::WorkspaceSpec::Volume { name } => {
            WorkspaceSpecWire::Volume { name: name.clone() }
        }
    });

    let (container_name, image) = resolve_container(
        store,
        agent.instance_id.as_deref(),
        agent.account_id.as_deref(),
    );

    RunSnapshot {
        run_id: run.id.clone(),
        task_id: run.task_id.clone(),
        agent: AgentSpecWire {
            agent_type: agent.agent_type.clone(),
            model: agent.model.clone(),
            parameters,
            instance_id: agent.instance_id.clone(),
            account_id: agent.account_id.clone(),
        },
        prompt: run.snapshot.prompt.clone(),
        workspace,
        container_name,
        image,
    }
}

pub fn auth_task_wire(session: &af_domain::AuthSession, agent_type_id: String) -> AuthTaskWire {
    AuthTaskWire {
        task_id: session.task_id.clone(),
        account_id: session.account_id.clone(),
        agent_type_id,
        node_id: session.node_id.clone(),
        method: session.method.clone(),
        status: status_to_string(&session.status),
        executed: session.executed,
        expires_at: session.expires_at,
    }
}
