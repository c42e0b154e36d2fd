use std::collections::HashMap;
use std::sync::Arc;

use crate::claude_code::ClaudeCodeAdapter;
use crate::contract::{AdapterError, AgentAdapter};
use crate::gemini_cli::GeminiCliAdapter;
use crate::qwen_code::QwenCodeAdapter;

/// Maps an agent type string (as it appears in `Task.spec.agent.type`) to
/// the adapter that handles it. "New agent types require an adapter plus a
/// name-normalisation entry, nothing else" (§9) — this map is that entry
/// point.
pub struct AdapterRegistry {
    by_agent_type: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin_adapters()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            by_agent_type: HashMap::new(),
        }
    }

    pub fn with_builtin_adapters() -> Self {
        let mut registry = Self::new();
        registry.register_for(&["claude-code", "claude"], Arc::new(ClaudeCodeAdapter));
        registry.register_for(&["qwen-code", "qwen"], Arc::new(QwenCodeAdapter));
        registry.register_for(&["gemini-cli", "gemini"], Arc::new(GeminiCliAdapter));
        registry
    }

    /// Register one adapter under every alias it should answer to (the
    /// "name-normalisation table", §4.5 step 5).
    pub fn register_for(&mut self, agent_types: &[&str], adapter: Arc<dyn AgentAdapter>) {
        for agent_type in agent_types {
            self.by_agent_type
                .insert(agent_type.to_string(), adapter.clone());
        }
    }

    pub fn get(&self, agent_type: &str) -> Result<Arc<dyn AgentAdapter>, AdapterError> {
        self.by_agent_type
            .get(agent_type)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownAgentType(agent_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_agent_types() {
        let registry = AdapterRegistry::with_builtin_adapters();
        assert_eq!(registry.get("claude-code").unwrap().name(), "claude-code");
        assert_eq!(registry.get("qwen-code").unwrap().name(), "qwen-code");
        assert_eq!(registry.get("gemini-cli").unwrap().name(), "gemini-cli");
    }

    #[test]
    fn unknown_agent_type_is_a_fatal_lookup_error() {
        let registry = AdapterRegistry::with_builtin_adapters();
        assert!(registry.get("gpt-5-cli").is_err());
    }
}
