use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id;
use crate::task::TaskSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
    Timeout,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    /// Invariant (i): `node_id` is set iff status is in this set.
    pub fn carries_node_id(self) -> bool {
        matches!(
            self,
            Self::Running | Self::Done | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

/// One attempt to execute a task. `snapshot` is an immutable audit copy of
/// the task spec taken at creation time — the scheduler and node manager
/// read from it, never from the live task, so a task edited mid-run cannot
/// change what's already executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub task_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub snapshot: TaskSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new(task_id: String, snapshot: TaskSpec) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("run"),
            task_id,
            status: RunStatus::Queued,
            node_id: None,
            started_at: None,
            finished_at: None,
            snapshot,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bind this run to a node and mark it running (scheduler tick, §4.2 step 6).
    pub fn start_on(&mut self, node_id: String) {
        self.status = RunStatus::Running;
        self.node_id = Some(node_id);
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Requeue a zombie run (§4.2 step 2): clear node_id, go back to queued.
    pub fn requeue(&mut self) {
        self.status = RunStatus::Queued;
        self.node_id = None;
        self.started_at = None;
        self.updated_at = Utc::now();
    }

    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AgentSpec, TaskSecurity};

    fn snap() -> TaskSpec {
        TaskSpec {
            prompt: "hi".into(),
            workspace: None,
            security: TaskSecurity::default(),
            agent: AgentSpec::default(),
        }
    }

    #[test]
    fn node_id_invariant_across_lifecycle() {
        let mut r = Run::new("task-1".into(), snap());
        assert!(!r.status.carries_node_id());
        assert!(r.node_id.is_none());

        r.start_on("node-1".into());
        assert!(r.status.carries_node_id());
        assert_eq!(r.node_id.as_deref(), Some("node-1"));
        assert!(r.started_at.is_some());

        r.finish(RunStatus::Done, None);
        assert!(r.status.is_terminal());
        assert!(r.finished_at.unwrap() >= r.started_at.unwrap());
    }

    #[test]
    fn requeue_clears_node_id() {
        let mut r = Run::new("task-1".into(), snap());
        r.start_on("node-1".into());
        r.requeue();
        assert_eq!(r.status, RunStatus::Queued);
        assert!(r.node_id.is_none());
        assert!(r.started_at.is_none());
    }
}
