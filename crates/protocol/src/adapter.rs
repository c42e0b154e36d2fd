use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::run_snapshot::{AgentSpecWire, WorkspaceSpecWire};

/// Pure input to `BuildCommand` (§6 adapter contract) — the run's agent
/// spec plus its resolved workspace, decoupled from the wire snapshot shape
/// so adapters don't depend on `af-protocol`'s transport framing.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub run_id: String,
    pub prompt: String,
    pub model: Option<String>,
    pub parameters: HashMap<String, Value>,
    pub workspace: Option<WorkspaceSpecWire>,
}

impl RunSpec {
    pub fn from_snapshot(run_id: String, agent: &AgentSpecWire, prompt: String, workspace: Option<WorkspaceSpecWire>) -> Self {
        Self {
            run_id,
            prompt,
            model: agent.model.clone(),
            parameters: agent.parameters.clone(),
            workspace,
        }
    }
}

/// `BuildCommand(spec, agent) → {image, command, args[], env{}, working_dir}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterCommand {
    pub image: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: String,
}
