use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventWire;

/// Messages exchanged over `/ws/runs/{id}/events` and `/ws/monitor` (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "event")]
    Event { data: EventWire },

    #[serde(rename = "status")]
    Status { data: RunStatusUpdate },

    #[serde(rename = "workflows")]
    Workflows { data: Value },

    #[serde(rename = "stats")]
    Stats { data: Value },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusUpdate {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
