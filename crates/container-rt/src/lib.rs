//! `af-container-rt` — the local container-CLI wrapper.
//!
//! The spec treats "the embedded container runtime" as out of scope (§1
//! Non-goals) and only requires that adapters and reconcilers drive real
//! container state through *some* narrow surface: create/start/stop/rm,
//! exec with a live stdout stream, cp, and volume management. This crate is
//! that surface, implemented by shelling out to a configurable CLI binary
//! (`docker` by default; anything compatible with the `docker` CLI verbs
//! works, including `podman` and `nerdctl`).

pub mod error;
pub mod exec_stream;
pub mod runtime;

pub use error::ContainerError;
pub use exec_stream::{ExecHandle, ExecLine};
pub use runtime::{ContainerRuntime, CreateSpec};
