//! Pending run-cancellation requests (§4.5, §8 scenario 6).
//!
//! `POST /runs/{id}/cancel` on a `running` run can't cancel the node's exec
//! directly — the gateway has no channel to the node outside heartbeats —
//! so the request is recorded here and drained into the next heartbeat
//! response's `directives.cancel_runs` for the owning node. Entries are
//! removed once the run reaches a terminal status.

use std::collections::HashSet;

use parking_lot::Mutex;

#[derive(Default)]
pub struct PendingCancels {
    run_ids: Mutex<HashSet<String>>,
}

impl PendingCancels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, run_id: &str) {
        self.run_ids.lock().insert(run_id.to_string());
    }

    pub fn clear(&self, run_id: &str) {
        self.run_ids.lock().remove(run_id);
    }

    /// Cancel ids outstanding among the given run ids assigned to one node.
    pub fn outstanding_for<'a>(&self, run_ids: impl Iterator<Item = &'a str>) -> Vec<String> {
        let pending = self.run_ids.lock();
        run_ids
            .filter(|id| pending.contains(*id))
            .map(|id| id.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_clear() {
        let p = PendingCancels::new();
        p.request("run-1");
        assert_eq!(
            p.outstanding_for(["run-1", "run-2"].into_iter()),
            vec!["run-1".to_string()]
        );
        p.clear("run-1");
        assert!(p.outstanding_for(["run-1"].into_iter()).is_empty());
    }
}
