use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The canonical, adapter-agnostic event types (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalEventType {
    RunStarted,
    RunCompleted,
    RunFailed,
    Message,
    Thinking,
    Progress,
    ToolUseStart,
    ToolResult,
    FileRead,
    FileWrite,
    FileDelete,
    Command,
    CommandOutput,
    ApprovalRequest,
    ApprovalResponse,
    Checkpoint,
    Heartbeat,
    SystemInfo,
    Result,
    Error,
    Warning,
}

/// One line of an append-only per-run event log. `(run_id, seq)` is unique;
/// `seq` starts at 1 and has no gaps within a single run (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: CanonicalEventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Event {
    pub fn new(run_id: String, seq: u64, event_type: CanonicalEventType, payload: Value) -> Self {
        Self {
            run_id,
            seq,
            event_type,
            timestamp: Utc::now(),
            payload,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: String) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            CanonicalEventType::RunCompleted | CanonicalEventType::RunFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_one_is_valid_start() {
        let e = Event::new("run-1".into(), 1, CanonicalEventType::RunStarted, Value::Null);
        assert_eq!(e.seq, 1);
        assert!(!e.is_terminal());
    }

    #[test]
    fn run_completed_is_terminal() {
        let e = Event::new(
            "run-1".into(),
            3,
            CanonicalEventType::RunCompleted,
            Value::Null,
        );
        assert!(e.is_terminal());
    }
}
