use std::collections::HashMap;
use std::sync::Arc;

use af_domain::AuthSession;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A node's heartbeat blob (§3, §4.1): capacity snapshot plus which runs it
/// currently believes it's executing. Expires `ttl` after the last write;
/// readers derive "online" purely from whether the key is still present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub node_id: String,
    pub labels: HashMap<String, String>,
    pub max_concurrent: u32,
    pub available: u32,
    pub running_runs: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// TTL key-value store (§2, §4.1): `heartbeats/{node_id}`,
/// `auth-sessions/{task_id}`, `auth-sessions/by-account/{account_id}`. A
/// real deployment would back this with Redis/etcd; here it's an in-memory
/// map with lazy expiry, matching the scope of "liveness store" the spec
/// treats as a narrow TTL primitive rather than a durable resource.
pub struct LivenessStore {
    heartbeats: RwLock<HashMap<String, Expiring<HeartbeatRecord>>>,
    auth_sessions: RwLock<HashMap<String, Expiring<AuthSession>>>,
    /// index account_id -> task_id, rebuilt lazily from `auth_sessions`.
    available: RwLock<bool>,
}

impl Default for LivenessStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessStore {
    pub fn new() -> Self {
        Self {
            heartbeats: RwLock::new(HashMap::new()),
            auth_sessions: RwLock::new(HashMap::new()),
            available: RwLock::new(true),
        }
    }

    /// Simulate the liveness store being unreachable, for exercising the
    /// §4.1/§4.8 45s-freshness-fallback degraded mode in tests.
    pub fn set_available(&self, available: bool) {
        *self.available.write() = available;
    }

    pub fn is_available(&self) -> bool {
        *self.available.read()
    }

    pub fn put_heartbeat(&self, record: HeartbeatRecord, ttl: Duration) {
        let expires_at = Utc::now() + ttl;
        self.heartbeats.write().insert(
            record.node_id.clone(),
            Expiring {
                value: record,
                expires_at,
            },
        );
    }

    fn is_live<T>(entry: &Expiring<T>, now: DateTime<Utc>) -> bool {
        now < entry.expires_at
    }

    /// The ids of nodes whose heartbeat key has not expired — the §4.1
    /// derivation of "online", independent of the stored `Node.status`
    /// column.
    pub fn online_node_ids(&self) -> Vec<String> {
        let now = Utc::now();
        self.heartbeats
            .read()
            .iter()
            .filter(|(_, e)| Self::is_live(e, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn get_heartbeat(&self, node_id: &str) -> Option<HeartbeatRecord> {
        let now = Utc::now();
        self.heartbeats
            .read()
            .get(node_id)
            .filter(|e| Self::is_live(e, now))
            .map(|e| e.value.clone())
    }

    // ── Auth sessions ────────────────────────────────────────────────

    pub fn put_auth_session(&self, session: AuthSession) {
        let ttl = (session.expires_at - Utc::now()).max(Duration::zero());
        let expires_at = Utc::now() + ttl + Duration::minutes(5);
        self.auth_sessions.write().insert(
            session.task_id.clone(),
            Expiring {
                value: session,
                expires_at,
            },
        );
    }

    pub fn get_auth_session(&self, task_id: &str) -> Option<AuthSession> {
        self.auth_sessions.read().get(task_id).map(|e| e.value.clone())
    }

    /// Invariant (iv): find the non-terminal, non-executed session for an
    /// account, if any — the "is there already one in flight?" query.
    pub fn find_blocking_session_for_account(&self, account_id: &str) -> Option<AuthSession> {
        self.auth_sessions
            .read()
            .values()
            .map(|e| &e.value)
            .find(|s| s.account_id == account_id && s.blocks_new_session())
            .cloned()
    }

    pub fn list_auth_sessions_for_node(&self, node_id: &str) -> Vec<AuthSession> {
        self.auth_sessions
            .read()
            .values()
            .map(|e| e.value.clone())
            .filter(|s| s.node_id == node_id)
            .collect()
    }

    pub fn list_auth_sessions(&self) -> Vec<AuthSession> {
        self.auth_sessions.read().values().map(|e| e.value.clone()).collect()
    }
}

pub type SharedLivenessStore = Arc<LivenessStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_expires_after_ttl() {
        let store = LivenessStore::new();
        store.put_heartbeat(
            HeartbeatRecord {
                node_id: "n1".into(),
                labels: HashMap::new(),
                max_concurrent: 1,
                available: 1,
                running_runs: vec![],
                last_seen: Utc::now(),
            },
            Duration::seconds(-1),
        );
        assert!(store.online_node_ids().is_empty());
    }

    #[test]
    fn fresh_heartbeat_is_online() {
        let store = LivenessStore::new();
        store.put_heartbeat(
            HeartbeatRecord {
                node_id: "n1".into(),
                labels: HashMap::new(),
                max_concurrent: 1,
                available: 1,
                running_runs: vec![],
                last_seen: Utc::now(),
            },
            Duration::seconds(30),
        );
        assert_eq!(store.online_node_ids(), vec!["n1".to_string()]);
    }

    #[test]
    fn at_most_one_blocking_session_per_account() {
        let store = LivenessStore::new();
        assert!(store.find_blocking_session_for_account("a1").is_none());
        let s = AuthSession::new("a1".into(), "n1".into(), "device_code".into());
        store.put_auth_session(s.clone());
        assert!(store.find_blocking_session_for_account("a1").is_some());
    }
}
