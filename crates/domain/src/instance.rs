use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Creating,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl InstanceStatus {
    /// §4.4 state machine transitions the reconciler is allowed to make.
    pub fn can_transition_to(self, next: Self) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Pending, Creating)
                | (Creating, Running)
                | (Creating, Error)
                | (Running, Error)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Pending)
                | (Error, Pending)
        )
    }
}

/// A long-lived container bound to one account's credentials (§3). Lifecycle
/// is declarative: the API only writes the target state; the node-side
/// reconciler drives the real container toward it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub account_id: String,
    pub agent_type_id: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(account_id: String, agent_type_id: String, node_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("inst"),
            account_id,
            agent_type_id,
            node_id,
            container_name: None,
            status: InstanceStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstanceStatus::*;

    #[test]
    fn legal_transitions() {
        assert!(Pending.can_transition_to(Creating));
        assert!(Creating.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Pending));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!Pending.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Running));
    }
}
