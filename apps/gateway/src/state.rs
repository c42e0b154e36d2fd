use std::sync::Arc;

use af_domain::Config;
use af_store::{LivenessStore, ResourceStore, SharedEventStream};
use tokio_util::sync::CancellationToken;

use crate::cancel::PendingCancels;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, the three stores named in §2
/// - **Security** — hashed tokens computed once at startup
/// - **Lifecycle** — root shutdown signal
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<ResourceStore>,
    pub liveness: Arc<LivenessStore>,
    pub events: SharedEventStream,
    pub pending_cancels: Arc<PendingCancels>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the shared node token (§6 "Authentication"). `None`
    /// means no token is configured — node-facing endpoints accept any
    /// caller (dev mode), matching the teacher's `api_token_hash` pattern.
    pub node_token_hash: Option<Vec<u8>>,

    // ── Lifecycle ──────────────────────────────────────────────────────
    pub shutdown: CancellationToken,
}

#[cfg(test)]
pub fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = AppState {
        config: Arc::new(Config::default()),
        store: ResourceStore::open(dir.path()),
        liveness: Arc::new(LivenessStore::new()),
        events: Arc::new(af_store::EventStream::new()),
        pending_cancels: Arc::new(PendingCancels::new()),
        node_token_hash: None,
        shutdown: CancellationToken::new(),
    };
    (dir, state)
}
