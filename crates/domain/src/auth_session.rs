use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id_underscore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSessionStatus {
    Assigned,
    Running,
    WaitingUser,
    WaitingOauth,
    Success,
    Failed,
    Timeout,
}

impl AuthSessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }
}

/// Ephemeral OAuth/device-code task (§3, §4.4). `executed` is the
/// at-most-once guard: the driver sets it as soon as it starts real work,
/// independent of `status`, so a crash between "executed" and "terminal"
/// can't be retried into a duplicate device-code container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub task_id: String,
    pub account_id: String,
    pub node_id: String,
    pub method: String,
    pub status: AuthSessionStatus,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(account_id: String, node_id: String, method: String) -> Self {
        let now = Utc::now();
        Self {
            task_id: new_id_underscore("auth"),
            account_id,
            node_id,
            method,
            status: AuthSessionStatus::Assigned,
            executed: false,
            oauth_url: None,
            user_code: None,
            terminal_port: None,
            message: None,
            created_at: now,
            expires_at: now + Duration::minutes(10),
        }
    }

    /// Invariant (iv): at most one non-terminal, non-executed session per account.
    pub fn blocks_new_session(&self) -> bool {
        !self.executed && !self.status.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_blocks_duplicates() {
        let s = AuthSession::new("acct-1".into(), "node-1".into(), "device_code".into());
        assert!(s.blocks_new_session());
    }

    #[test]
    fn executed_session_does_not_block() {
        let mut s = AuthSession::new("acct-1".into(), "node-1".into(), "device_code".into());
        s.executed = true;
        assert!(!s.blocks_new_session());
    }

    #[test]
    fn terminal_session_does_not_block() {
        let mut s = AuthSession::new("acct-1".into(), "node-1".into(), "device_code".into());
        s.status = AuthSessionStatus::Failed;
        assert!(!s.blocks_new_session());
    }
}
