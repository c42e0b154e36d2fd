use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Pending,
    Starting,
    Running,
    Closed,
    Error,
}

/// A transient interactive shell into a running container (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSession {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub container_name: String,
    pub node_id: String,
    pub status: TerminalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TerminalSession {
    pub fn new(container_name: String, node_id: String) -> Self {
        Self {
            id: new_id("term"),
            instance_id: None,
            container_name,
            node_id,
            status: TerminalStatus::Pending,
            port: None,
            url: None,
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
