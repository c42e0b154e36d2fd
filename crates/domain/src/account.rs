use serde::{Deserialize, Serialize};

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Authenticating,
    Authenticated,
    Error,
}

/// A persistent identity used by an agent CLI; owns a credentials volume
/// once authenticated (§3, invariant iii ties `Instance.running` to this).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub agent_type_id: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    pub status: AccountStatus,
}

impl Account {
    pub fn new(name: String, agent_type_id: String, node_id: String) -> Self {
        Self {
            id: new_id("acct"),
            name,
            agent_type_id,
            node_id,
            volume_name: None,
            status: AccountStatus::Pending,
        }
    }

    /// Invariant (iii): only `authenticated` + non-empty volume makes an
    /// account usable by a running instance.
    pub fn is_usable(&self) -> bool {
        self.status == AccountStatus::Authenticated
            && self.volume_name.as_deref().is_some_and(|v| !v.is_empty())
    }

    pub fn mark_authenticated(&mut self, volume_name: String) {
        self.volume_name = Some(volume_name);
        self.status = AccountStatus::Authenticated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_usable_until_volume_is_set() {
        let mut a = Account::new("a".into(), "qwen-code".into(), "node-1".into());
        assert!(!a.is_usable());
        a.mark_authenticated("vol-a".into());
        assert!(a.is_usable());
    }
}
