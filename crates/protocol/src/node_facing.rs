use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /api/v1/nodes/{id}/instances` entry and `PATCH /api/v1/instances/{id}`
/// body (§4.4, §4.5). The node reconciler only ever writes `status`,
/// `container_name`; the API owns everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceWire {
    pub id: String,
    pub account_id: String,
    pub agent_type_id: String,
    pub node_id: String,
    #[serde(default)]
    pub container_name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstancePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// `GET /api/v1/nodes/{id}/auth-tasks` entry and `PATCH
/// /api/v1/auth-tasks/{id}` body (§4.4 OAuth driver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTaskWire {
    pub task_id: String,
    pub account_id: String,
    pub agent_type_id: String,
    pub node_id: String,
    pub method: String,
    pub status: String,
    pub executed: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthTaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}

/// `GET /api/v1/nodes/{id}/terminal-sessions` entry and `PATCH
/// /api/v1/terminal-sessions/{id}` body — mirrors the instance reconciler
/// pattern (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSessionWire {
    pub id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    pub container_name: String,
    pub node_id: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerminalSessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `PATCH /api/v1/runs/{id}` body (§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
