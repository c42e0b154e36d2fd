use af_protocol::adapter::{AdapterCommand, RunSpec};
use serde_json::Value;

use crate::contract::{AdapterError, AgentAdapter, AgentDescriptor, ParsedEvent};
use af_domain::CanonicalEventType;

/// Adapter for Google's `gemini` CLI. Unlike the other two, it does not
/// emit structured JSON by default; `--telemetry-otlp` is not available
/// inside a stripped-down container image, so this adapter instead prefixes
/// every line with a small sentinel the wrapper script inside the image
/// writes (`GEMINI_EVENT <kind> <json>`), and treats everything else as
/// plain message chatter.
pub struct GeminiCliAdapter;

const SENTINEL: &str = "GEMINI_EVENT";

impl AgentAdapter for GeminiCliAdapter {
    fn name(&self) -> &'static str {
        "gemini-cli"
    }

    fn validate(&self, agent: &AgentDescriptor) -> Result<(), AdapterError> {
        if agent.agent_type != "gemini-cli" {
            return Err(AdapterError::UnsupportedAgentType {
                adapter: self.name(),
                agent_type: agent.agent_type.clone(),
            });
        }
        Ok(())
    }

    fn build_command(&self, spec: &RunSpec, agent: &AgentDescriptor) -> AdapterCommand {
        let mut args = vec!["-p".to_string(), spec.prompt.clone()];
        if let Some(model) = &spec.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        AdapterCommand {
            image: agent.image.clone(),
            command: "gemini".to_string(),
            args,
            env: std::collections::HashMap::new(),
            working_dir: "/workspace".to_string(),
        }
    }

    fn parse_event(&self, line: &str) -> Option<ParsedEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(rest) = line.strip_prefix(SENTINEL) {
            let rest = rest.trim();
            let (kind, json) = rest.split_once(' ')?;
            let payload: Value = serde_json::from_str(json).ok()?;
            let event_type = match kind {
                "tool" => CanonicalEventType::ToolUseStart,
                "tool_result" => CanonicalEventType::ToolResult,
                "checkpoint" => CanonicalEventType::Checkpoint,
                "done" => CanonicalEventType::Result,
                "error" => CanonicalEventType::Error,
                _ => return None,
            };
            return Some(ParsedEvent { event_type, payload });
        }

        // Plain stdout line, not a sentinel event: surface as a message so
        // nothing the CLI prints is silently dropped.
        Some(ParsedEvent {
            event_type: CanonicalEventType::Message,
            payload: serde_json::json!({ "content": line }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_become_message_events() {
        let adapter = GeminiCliAdapter;
        let parsed = adapter.parse_event("Thinking about the fix...").unwrap();
        assert_eq!(parsed.event_type, CanonicalEventType::Message);
    }

    #[test]
    fn sentinel_lines_are_parsed_as_typed_events() {
        let adapter = GeminiCliAdapter;
        let parsed = adapter
            .parse_event(r#"GEMINI_EVENT tool {"name":"edit_file"}"#)
            .unwrap();
        assert_eq!(parsed.event_type, CanonicalEventType::ToolUseStart);
    }

    #[test]
    fn malformed_sentinel_json_does_not_panic() {
        let adapter = GeminiCliAdapter;
        assert!(adapter.parse_event("GEMINI_EVENT tool not-json").is_none());
    }
}
