//! `af-protocol` — wire DTOs shared by the gateway and the node manager (§6).
//!
//! Nothing here talks to the network or a store; these are the shapes that
//! cross the wire, independent of transport (HTTP JSON bodies and WS
//! messages both use the same envelopes).

pub mod adapter;
pub mod directive;
pub mod events;
pub mod node_facing;
pub mod run_snapshot;
pub mod ws;

pub use adapter::{AdapterCommand, RunSpec};
pub use directive::{Directives, HeartbeatCapacity, HeartbeatRequest, HeartbeatResponse};
pub use events::{EventBatchRequest, EventWire};
pub use node_facing::{
    AuthTaskPatch, AuthTaskWire, InstancePatch, InstanceWire, RunPatch, TerminalSessionPatch,
    TerminalSessionWire,
};
pub use run_snapshot::RunSnapshot;
pub use ws::WsMessage;
