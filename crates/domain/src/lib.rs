//! `af-domain` — core resource types for the agent fleet orchestrator.
//!
//! Every resource the control plane manages (tasks, runs, events, nodes,
//! accounts, auth sessions, instances, terminal sessions, proxies) is
//! defined here, along with the shared `Config` loader. Nothing in this
//! crate talks to a store or the network — it's pure data + invariants.

pub mod account;
pub mod auth_session;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod instance;
pub mod node;
pub mod proxy;
pub mod run;
pub mod task;
pub mod terminal;

pub use account::{Account, AccountStatus};
pub use auth_session::{AuthSession, AuthSessionStatus};
pub use config::{Config, CorsConfig, GatewayConfig, RateLimitConfig};
pub use error::DomainError;
pub use event::{CanonicalEventType, Event};
pub use instance::{Instance, InstanceStatus};
pub use node::{Node, NodeCapacity, NodeStatus};
pub use proxy::{Proxy, ProxyType};
pub use run::{Run, RunStatus};
pub use task::{AgentSpec, Task, TaskSecurity, TaskSpec, TaskStatus, WorkspaceSpec};
pub use terminal::{TerminalSession, TerminalStatus};
