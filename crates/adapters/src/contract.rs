use af_domain::CanonicalEventType;
use af_protocol::adapter::{AdapterCommand, RunSpec};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter `{adapter}` does not support agent type `{agent_type}`")]
    UnsupportedAgentType { adapter: &'static str, agent_type: String },

    #[error("no adapter registered for agent type `{0}`")]
    UnknownAgentType(String),
}

/// An agent carried by the run: just enough to validate and build a
/// command from, decoupled from `af_domain::Account`/`Instance` so adapters
/// don't need to depend on the store.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub agent_type: String,
    pub image: String,
}

/// One parsed line of agent CLI stdout, ready to be stamped with
/// `run_id`/`seq`/`timestamp` by the node manager (§4.5 step 5).
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event_type: CanonicalEventType,
    pub payload: Value,
}

/// The §6 adapter contract. Each concrete agent CLI gets one implementation;
/// adding a new CLI means writing one of these plus a name-normalisation
/// entry in the registry — nothing else in the system changes.
pub trait AgentAdapter: Send + Sync {
    /// Stable identifier, e.g. `"claude-code"`.
    fn name(&self) -> &'static str;

    /// Confirm this adapter handles the given agent type.
    fn validate(&self, agent: &AgentDescriptor) -> Result<(), AdapterError>;

    /// Pure function of spec + agent: no I/O, no side effects.
    fn build_command(&self, spec: &RunSpec, agent: &AgentDescriptor) -> AdapterCommand;

    /// Parse one stdout line into a canonical event. Returns `None` for
    /// lines that should be ignored (blank lines, non-JSON chatter).
    /// Must never panic or propagate a parse error — an unparseable line
    /// is simply dropped, per the contract's "never fail" clause.
    fn parse_event(&self, line: &str) -> Option<ParsedEvent>;
}
