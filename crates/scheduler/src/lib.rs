//! `af-scheduler` — the scheduler tick and task-status propagator (§4.2, §4.3).

use std::collections::BTreeMap;

use af_domain::{Run, RunStatus};
use af_store::{LivenessStore, ResourceStore};
use chrono::{Duration, Utc};

/// Fallback freshness window used when the liveness store is unreachable
/// (§4.1, §4.8): only rows whose `last_heartbeat` is within this age are
/// treated as online.
pub const FRESHNESS_FALLBACK_SECS: i64 = 45;

/// A zombie run is only requeued once it has been `running` for at least
/// this long with zero events (§4.2 step 2) — young runs get a grace period
/// in case the node just hasn't posted `run_started` yet.
pub const ZOMBIE_GRACE_SECS: i64 = 30;

/// Runs fetched per tick (§4.2 step 3).
pub const QUEUE_BATCH_SIZE: usize = 10;

/// One scheduler tick's outcome, returned for logging/testing rather than
/// swallowed — callers (the gateway's scheduler loop) log it at intervals.
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub requeued: Vec<String>,
    pub scheduled: Vec<(String, String)>, // (run_id, node_id)
    pub left_queued: Vec<String>,
}

/// The set of online node ids, derived per §4.1: from the liveness store
/// when available, else the 45s `last_heartbeat` freshness fallback.
fn online_node_ids(store: &ResourceStore, liveness: &LivenessStore) -> Vec<String> {
    if liveness.is_available() {
        return liveness.online_node_ids();
    }
    let now = Utc::now();
    store
        .list_nodes()
        .into_iter()
        .filter(|n| n.is_fresh(now, FRESHNESS_FALLBACK_SECS))
        .map(|n| n.id)
        .collect()
}

/// Run one scheduler tick (§4.2). Pure with respect to time: all "now"
/// comparisons use `Utc::now()` at call time, so tests exercise real clock
/// behavior rather than an injected one — matching how `af-domain`'s own
/// tests treat timestamps.
pub fn tick(store: &ResourceStore, liveness: &LivenessStore) -> TickReport {
    let mut report = TickReport::default();
    let online: std::collections::HashSet<String> =
        online_node_ids(store, liveness).into_iter().collect();

    // Step 2: requeue zombies.
    let now = Utc::now();
    for run in store.list_runs_by_status(RunStatus::Running) {
        let Some(node_id) = run.node_id.clone() else {
            continue;
        };
        let Some(started_at) = run.started_at else {
            continue;
        };
        let stale_node = !online.contains(&node_id);
        let old_enough = (now - started_at) > Duration::seconds(ZOMBIE_GRACE_SECS);
        let no_events = !store.has_events(&run.id);
        if stale_node && old_enough && no_events {
            store.update_run(&run.id, |r| r.requeue());
            report.requeued.push(run.id.clone());
            tracing::warn!(run_id = %run.id, node_id = %node_id, "requeued zombie run");
        }
    }

    // Step 3: fetch queued runs (bounded batch).
    let mut queued: Vec<Run> = store.list_runs_by_status(RunStatus::Queued);
    queued.truncate(QUEUE_BATCH_SIZE);

    // Step 4: per-node running counts, refreshed for this tick.
    let mut running_count: BTreeMap<String, usize> = online
        .iter()
        .map(|id| (id.clone(), store.count_running_for_node(id)))
        .collect();

    for run in queued {
        match schedule_one(store, liveness, &online, &mut running_count, &run) {
            Some(node_id) => {
                store.update_run(&run.id, |r| r.start_on(node_id.clone()));
                store.propagate_task_status(&run.task_id, RunStatus::Running);
                report.scheduled.push((run.id.clone(), node_id));
            }
            None => report.left_queued.push(run.id.clone()),
        }
    }

    report
}

fn max_concurrent(liveness: &LivenessStore, store: &ResourceStore, node_id: &str) -> u32 {
    if let Some(hb) = liveness.get_heartbeat(node_id) {
        return hb.max_concurrent.max(1);
    }
    store
        .get_node(node_id)
        .map(|n| n.capacity.max_concurrent_or_default())
        .unwrap_or(1)
}

/// Step 5: bind a single queued run to a node, or leave it queued.
fn schedule_one(
    store: &ResourceStore,
    liveness: &LivenessStore,
    online: &std::collections::HashSet<String>,
    running_count: &mut BTreeMap<String, usize>,
    run: &Run,
) -> Option<String> {
    let agent = &run.snapshot.agent;
    let preferred_node = agent
        .instance_id
        .as_deref()
        .and_then(|id| store.get_instance(id))
        .map(|i| i.node_id)
        .or_else(|| {
            agent
                .account_id
                .as_deref()
                .and_then(|id| store.get_account(id))
                .map(|a| a.node_id)
        });

    if let Some(node_id) = preferred_node {
        // Locality is a correctness requirement: never fall back to another
        // node when a preferred one is named but unavailable (§4.2 step 5).
        if !online.contains(&node_id) {
            return None;
        }
        let cap = max_concurrent(liveness, store, &node_id);
        let running = *running_count.get(&node_id).unwrap_or(&0);
        if running >= cap as usize {
            return None;
        }
        *running_count.entry(node_id.clone()).or_insert(0) += 1;
        return Some(node_id);
    }

    let task_labels = &run.snapshot.security.labels;
    let mut best: Option<(String, i64)> = None;
    for node_id in online {
        let Some(node) = store.get_node(node_id) else {
            continue;
        };
        if !node.matches_labels(task_labels) {
            continue;
        }
        let cap = max_concurrent(liveness, store, node_id) as i64;
        let running = *running_count.get(node_id).unwrap_or(&0) as i64;
        let free = cap - running;
        if free <= 0 {
            continue;
        }
        if best.as_ref().is_none_or(|(_, best_free)| free > *best_free) {
            best = Some((node_id.clone(), free));
        }
    }

    let (node_id, _) = best?;
    *running_count.entry(node_id.clone()).or_insert(0) += 1;
    Some(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_domain::task::{AgentSpec, TaskSecurity, TaskSpec};
    use af_domain::{Instance, Node, Task};
    use chrono::Duration as ChronoDuration;

    fn spec(agent: AgentSpec) -> TaskSpec {
        TaskSpec {
            prompt: "hi".into(),
            workspace: None,
            security: TaskSecurity::default(),
            agent,
        }
    }

    fn labeled_spec(labels: &[(&str, &str)]) -> TaskSpec {
        let mut security = TaskSecurity::default();
        for (k, v) in labels {
            security.labels.insert(k.to_string(), v.to_string());
        }
        TaskSpec {
            prompt: "hi".into(),
            workspace: None,
            security,
            agent: AgentSpec::default(),
        }
    }

    fn online_node(store: &ResourceStore, liveness: &LivenessStore, id: &str, max_concurrent: u32) {
        let mut node = Node::new(id.to_string());
        node.capacity.max_concurrent = Some(max_concurrent);
        store.upsert_node(node);
        liveness.put_heartbeat(
            af_store::HeartbeatRecord {
                node_id: id.to_string(),
                labels: Default::default(),
                max_concurrent,
                available: max_concurrent,
                running_runs: vec![],
                last_seen: Utc::now(),
            },
            ChronoDuration::seconds(30),
        );
    }

    #[test]
    fn schedules_queued_run_to_online_node() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());
        let liveness = LivenessStore::new();
        online_node(&store, &liveness, "n1", 1);

        let task = store.create_task(Task::new("t".into(), spec(AgentSpec::default())));
        let run = store.create_run(Run::new(task.id, spec(AgentSpec::default())));

        let report = tick(&store, &liveness);
        assert_eq!(report.scheduled, vec![(run.id.clone(), "n1".to_string())]);
        let updated = store.get_run(&run.id).unwrap();
        assert_eq!(updated.status, RunStatus::Running);
        assert_eq!(updated.node_id.as_deref(), Some("n1"));
        assert_eq!(store.get_task(&updated.task_id).unwrap().status, af_domain::TaskStatus::Running);
    }

    #[test]
    fn respects_label_selector() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());
        let liveness = LivenessStore::new();
        online_node(&store, &liveness, "n1", 1);
        store.update_node("n1", |n| {
            n.labels.insert("gpu".into(), "a100".into());
        });

        let task = store.create_task(Task::new("t".into(), labeled_spec(&[("gpu", "h100")])));
        store.create_run(Run::new(task.id, labeled_spec(&[("gpu", "h100")])));

        let report = tick(&store, &liveness);
        assert!(report.scheduled.is_empty());
        assert_eq!(report.left_queued.len(), 1);
    }

    #[test]
    fn preferred_node_offline_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());
        let liveness = LivenessStore::new();
        online_node(&store, &liveness, "n2", 1);

        let mut instance = Instance::new("acct-1".into(), "qwen-code".into(), "n1".into());
        instance.node_id = "n1".to_string();
        store.create_instance(instance.clone());

        let agent = AgentSpec { instance_id: Some(instance.id.clone()), ..Default::default() };
        let task = store.create_task(Task::new("t".into(), spec(agent.clone())));
        store.create_run(Run::new(task.id, spec(agent)));

        let report = tick(&store, &liveness);
        assert!(report.scheduled.is_empty());
        assert_eq!(report.left_queued.len(), 1);
    }

    #[test]
    fn zombie_run_with_no_events_is_requeued_then_rescheduled() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());
        let liveness = LivenessStore::new();

        let task = store.create_task(Task::new("t".into(), spec(AgentSpec::default())));
        let run = store.create_run(Run::new(task.id, spec(AgentSpec::default())));
        store.update_run(&run.id, |r| {
            r.start_on("n1".into());
            r.started_at = Some(Utc::now() - ChronoDuration::seconds(40));
        });
        // n1 is not in the liveness store at all: offline.
        online_node(&store, &liveness, "n2", 1);

        let report = tick(&store, &liveness);
        assert_eq!(report.requeued, vec![run.id.clone()]);
        assert_eq!(report.scheduled, vec![(run.id, "n2".to_string())]);
    }

    #[test]
    fn zombie_run_with_events_is_never_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());
        let liveness = LivenessStore::new();

        let task = store.create_task(Task::new("t".into(), spec(AgentSpec::default())));
        let run = store.create_run(Run::new(task.id, spec(AgentSpec::default())));
        store.update_run(&run.id, |r| {
            r.start_on("n1".into());
            r.started_at = Some(Utc::now() - ChronoDuration::seconds(40));
        });
        store.append_events(
            &run.id,
            vec![af_domain::Event::new(
                run.id.clone(),
                1,
                af_domain::CanonicalEventType::RunStarted,
                serde_json::Value::Null,
            )],
        );

        let report = tick(&store, &liveness);
        assert!(report.requeued.is_empty());
        assert_eq!(store.get_run(&run.id).unwrap().status, RunStatus::Running);
    }
}
