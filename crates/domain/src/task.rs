use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Security/labels attached to a task spec. Labels are a scheduling selector
/// (§4.2): a node must carry every key/value pair for the task to land there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSecurity {
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

/// The `agent` sub-object of a task spec: which agent CLI, on what account
/// or instance, with what model/parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Workspace preparation declared by a task: a git checkout, a local path
/// already present on the node, or a named volume to ensure exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkspaceSpec {
    Git {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
    },
    LocalPath {
        path: String,
    },
    Volume {
        name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceSpec>,
    #[serde(default)]
    pub security: TaskSecurity,
    #[serde(default)]
    pub agent: AgentSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    pub status: TaskStatus,
    pub spec: TaskSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(name: String, spec: TaskSpec) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("task"),
            parent_id: None,
            name,
            status: TaskStatus::Pending,
            spec,
            context: None,
            agent_id: None,
            template_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending() {
        let t = Task::new(
            "t".into(),
            TaskSpec {
                prompt: "hi".into(),
                workspace: None,
                security: TaskSecurity::default(),
                agent: AgentSpec::default(),
            },
        );
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(!t.is_terminal());
        assert!(t.id.starts_with("task-"));
    }
}
