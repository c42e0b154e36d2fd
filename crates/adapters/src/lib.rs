//! `af-adapters` — the agent-CLI adapter contract and concrete adapters (§6).
//!
//! Agent CLIs differ irreconcilably in their stdout formats; `parse_event`
//! is the only pluggable code path the rest of the system depends on (§9).

pub mod claude_code;
pub mod contract;
pub mod gemini_cli;
pub mod qwen_code;
pub mod registry;

pub use contract::{AdapterError, AgentAdapter, AgentDescriptor, ParsedEvent};
pub use registry::AdapterRegistry;
