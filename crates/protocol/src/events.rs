use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One canonical event as it crosses the wire — `POST /runs/{id}/events`
/// batch entries and event-gateway payloads share this shape (§4.5, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventWire {
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// `POST /api/v1/runs/{id}/events` body — a batch, posted idempotently
/// keyed by `(run_id, seq)` (§8 round-trip law).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatchRequest {
    pub events: Vec<EventWire>,
}
