//! `af-store` — persistence for the control plane (§2, §6 "Persisted state
//! layout"): the relational store, the TTL liveness store, and the per-run
//! event stream.

pub mod event_stream;
pub mod liveness_store;
pub mod resource_store;

pub use event_stream::{EventStream, SharedEventStream};
pub use liveness_store::{HeartbeatRecord, LivenessStore, SharedLivenessStore};
pub use resource_store::ResourceStore;
