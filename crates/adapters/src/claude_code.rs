use af_protocol::adapter::{AdapterCommand, RunSpec};
use af_protocol::run_snapshot::WorkspaceSpecWire;
use serde_json::Value;

use crate::contract::{AdapterError, AgentAdapter, AgentDescriptor, ParsedEvent};
use af_domain::CanonicalEventType;

/// Adapter for Anthropic's `claude` CLI in `--output-format stream-json` mode.
/// Each stdout line is one JSON object with a `type` discriminant.
pub struct ClaudeCodeAdapter;

impl AgentAdapter for ClaudeCodeAdapter {
    fn name(&self) -> &'static str {
        "claude-code"
    }

    fn validate(&self, agent: &AgentDescriptor) -> Result<(), AdapterError> {
        if agent.agent_type != "claude-code" {
            return Err(AdapterError::UnsupportedAgentType {
                adapter: self.name(),
                agent_type: agent.agent_type.clone(),
            });
        }
        Ok(())
    }

    fn build_command(&self, spec: &RunSpec, agent: &AgentDescriptor) -> AdapterCommand {
        let mut args = vec![
            "-p".to_string(),
            spec.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(model) = &spec.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        let mut env = std::collections::HashMap::new();
        if let Some(Value::String(tools)) = spec.parameters.get("allowed_tools") {
            env.insert("CLAUDE_ALLOWED_TOOLS".to_string(), tools.clone());
        }

        let working_dir = match &spec.workspace {
            Some(WorkspaceSpecWire::Volume { .. }) | Some(WorkspaceSpecWire::Git { .. }) => {
                "/workspace".to_string()
            }
            Some(WorkspaceSpecWire::LocalPath { path }) => path.clone(),
            None => "/workspace".to_string(),
        };

        AdapterCommand {
            image: agent.image.clone(),
            command: "claude".to_string(),
            args,
            env,
            working_dir,
        }
    }

    fn parse_event(&self, line: &str) -> Option<ParsedEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let v: Value = serde_json::from_str(line).ok()?;
        let kind = v.get("type")?.as_str()?;

        let event_type = match kind {
            "assistant" => CanonicalEventType::Message,
            "thinking" => CanonicalEventType::Thinking,
            "tool_use" => CanonicalEventType::ToolUseStart,
            "tool_result" => CanonicalEventType::ToolResult,
            "system" => CanonicalEventType::SystemInfo,
            "result" => CanonicalEventType::Result,
            "error" => CanonicalEventType::Error,
            _ => return None,
        };
        Some(ParsedEvent {
            event_type,
            payload: v,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_foreign_agent_type() {
        let adapter = ClaudeCodeAdapter;
        let agent = AgentDescriptor {
            agent_type: "qwen-code".into(),
            image: "img".into(),
        };
        assert!(adapter.validate(&agent).is_err());
    }

    #[test]
    fn parses_assistant_line_as_message() {
        let adapter = ClaudeCodeAdapter;
        let parsed = adapter
            .parse_event(r#"{"type":"assistant","message":{"content":"hi"}}"#)
            .unwrap();
        assert_eq!(parsed.event_type, CanonicalEventType::Message);
    }

    #[test]
    fn unparsable_line_returns_none_not_panic() {
        let adapter = ClaudeCodeAdapter;
        assert!(adapter.parse_event("not json at all").is_none());
        assert!(adapter.parse_event("").is_none());
    }

    #[test]
    fn build_command_carries_model_and_prompt() {
        let adapter = ClaudeCodeAdapter;
        let spec = RunSpec {
            run_id: "run-1".into(),
            prompt: "hi".into(),
            model: Some("claude-opus".into()),
            parameters: Default::default(),
            workspace: None,
        };
        let agent = AgentDescriptor {
            agent_type: "claude-code".into(),
            image: "img".into(),
        };
        let cmd = adapter.build_command(&spec, &agent);
        assert!(cmd.args.contains(&"hi".to_string()));
        assert!(cmd.args.contains(&"claude-opus".to_string()));
    }
}
