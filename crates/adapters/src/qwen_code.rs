use af_protocol::adapter::{AdapterCommand, RunSpec};
use af_protocol::run_snapshot::WorkspaceSpecWire;
use serde_json::Value;

use crate::contract::{AdapterError, AgentAdapter, AgentDescriptor, ParsedEvent};
use af_domain::CanonicalEventType;

/// Adapter for Alibaba's `qwen` CLI, which emits one NDJSON object per line
/// under a flatter `event`/`data` envelope than `claude-code`'s `type`
/// discriminant.
pub struct QwenCodeAdapter;

impl AgentAdapter for QwenCodeAdapter {
    fn name(&self) -> &'static str {
        "qwen-code"
    }

    fn validate(&self, agent: &AgentDescriptor) -> Result<(), AdapterError> {
        if agent.agent_type != "qwen-code" {
            return Err(AdapterError::UnsupportedAgentType {
                adapter: self.name(),
                agent_type: agent.agent_type.clone(),
            });
        }
        Ok(())
    }

    fn build_command(&self, spec: &RunSpec, agent: &AgentDescriptor) -> AdapterCommand {
        let mut args = vec!["--prompt".to_string(), spec.prompt.clone(), "--json".to_string()];
        if let Some(model) = &spec.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        let working_dir = match &spec.workspace {
            Some(WorkspaceSpecWire::LocalPath { path }) => path.clone(),
            _ => "/workspace".to_string(),
        };

        AdapterCommand {
            image: agent.image.clone(),
            command: "qwen".to_string(),
            args,
            env: std::collections::HashMap::new(),
            working_dir,
        }
    }

    fn parse_event(&self, line: &str) -> Option<ParsedEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let v: Value = serde_json::from_str(line).ok()?;
        let kind = v.get("event")?.as_str()?;
        let payload = v.get("data").cloned().unwrap_or(Value::Null);

        let event_type = match kind {
            "text" => CanonicalEventType::Message,
            "reasoning" => CanonicalEventType::Thinking,
            "tool_call" => CanonicalEventType::ToolUseStart,
            "tool_output" => CanonicalEventType::ToolResult,
            "file_write" => CanonicalEventType::FileWrite,
            "file_read" => CanonicalEventType::FileRead,
            "shell" => CanonicalEventType::Command,
            "shell_output" => CanonicalEventType::CommandOutput,
            "done" => CanonicalEventType::Result,
            "fatal" => CanonicalEventType::Error,
            _ => return None,
        };
        Some(ParsedEvent { event_type, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call_as_tool_use_start() {
        let adapter = QwenCodeAdapter;
        let parsed = adapter
            .parse_event(r#"{"event":"tool_call","data":{"name":"grep"}}"#)
            .unwrap();
        assert_eq!(parsed.event_type, CanonicalEventType::ToolUseStart);
        assert_eq!(parsed.payload["name"], "grep");
    }

    #[test]
    fn unknown_event_kind_is_ignored() {
        let adapter = QwenCodeAdapter;
        assert!(adapter
            .parse_event(r#"{"event":"heartbeat_ping","data":{}}"#)
            .is_none());
    }

    #[test]
    fn build_command_uses_prompt_flag() {
        let adapter = QwenCodeAdapter;
        let spec = RunSpec {
            run_id: "run-1".into(),
            prompt: "refactor".into(),
            model: None,
            parameters: Default::default(),
            workspace: None,
        };
        let agent = AgentDescriptor {
            agent_type: "qwen-code".into(),
            image: "img".into(),
        };
        let cmd = adapter.build_command(&spec, &agent);
        assert_eq!(cmd.command, "qwen");
        assert!(cmd.args.contains(&"refactor".to_string()));
    }
}
