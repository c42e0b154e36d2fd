use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `POST /api/v1/nodes/heartbeat` request body (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: String,
    pub status: String,
    pub hostname: String,
    pub ips: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub running_runs: Vec<String>,
    pub capacity: HeartbeatCapacity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatCapacity {
    pub max_concurrent: u32,
    pub available: u32,
}

/// `POST /api/v1/nodes/heartbeat` response body.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeartbeatResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<Directives>,
}

impl HeartbeatResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            directives: None,
        }
    }

    pub fn with_cancel_runs(mut self, run_ids: Vec<String>) -> Self {
        if !run_ids.is_empty() {
            self.directives = Some(Directives { cancel_runs: run_ids });
        }
        self
    }
}

/// Server-side directives a node must enact before its next tick (§4.5, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Directives {
    #[serde(default)]
    pub cancel_runs: Vec<String>,
}
