use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a node receives from `GET /nodes/{id}/runs` for each assigned run
/// (§4.5 step 1). A frozen copy of the task spec at dispatch time — the
/// node never re-reads the task, only the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub task_id: String,
    pub agent: AgentSpecWire,
    pub prompt: String,
    #[serde(default)]
    pub workspace: Option<WorkspaceSpecWire>,
    /// Resolved by the gateway from `agent.instance_id`/`agent.account_id`
    /// at dispatch time (§4.5 step 2) so the node never has to perform its
    /// own instance/account lookup over HTTP mid-run.
    #[serde(default)]
    pub container_name: Option<String>,
    /// Agent image to run the command in, resolved alongside
    /// `container_name`.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpecWire {
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkspaceSpecWire {
    Git {
        url: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        commit: Option<String>,
    },
    LocalPath {
        path: String,
    },
    Volume {
        name: String,
    },
}
