use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
}

/// Free-form capacity blob: `max_concurrent` plus whatever other keys a node
/// wants to advertise (GPUs, memory, etc). Only `max_concurrent` is
/// interpreted by the scheduler; default 1 if absent or unparseable (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeCapacity {
    #[serde(default)]
    pub max_concurrent: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeCapacity {
    pub fn max_concurrent_or_default(&self) -> u32 {
        match self.max_concurrent {
            Some(n) if n > 0 => n,
            _ => 1,
        }
    }
}

/// A worker host. `status` here is the advisory, stale-by-design column
/// (§3, §4.1) — the scheduler never reads it directly for online/offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub capacity: NodeCapacity,
    pub last_heartbeat: DateTime<Utc>,
}

impl Node {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: NodeStatus::Online,
            labels: BTreeMap::new(),
            capacity: NodeCapacity::default(),
            last_heartbeat: Utc::now(),
        }
    }

    /// §4.2 label-subset match: every task label key/value must be present on the node.
    pub fn matches_labels(&self, task_labels: &BTreeMap<String, String>) -> bool {
        task_labels
            .iter()
            .all(|(k, v)| self.labels.get(k) == Some(v))
    }

    /// §4.1 fallback freshness filter when the liveness store is unreachable.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age_secs: i64) -> bool {
        (now - self.last_heartbeat).num_seconds() < max_age_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_subset_match() {
        let mut n = Node::new("n1".into());
        n.labels.insert("gpu".into(), "a100".into());
        n.labels.insert("region".into(), "us".into());

        let mut want = BTreeMap::new();
        want.insert("gpu".into(), "a100".into());
        assert!(n.matches_labels(&want));

        want.insert("region".into(), "eu".into());
        assert!(!n.matches_labels(&want));
    }

    #[test]
    fn max_concurrent_defaults_to_one() {
        let cap = NodeCapacity::default();
        assert_eq!(cap.max_concurrent_or_default(), 1);
    }
}
