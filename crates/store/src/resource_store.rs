use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use af_domain::{
    Account, Event, Instance, Node, Proxy, Run, RunStatus, Task, TaskStatus, TerminalSession,
};
use parking_lot::RwLock;

/// The relational store (§2, §6 "Persisted state layout"): tasks, runs,
/// events, nodes, accounts, instances, terminal_sessions, proxies, with
/// foreign-key cascades. Each resource kind is an in-memory map guarded by
/// its own lock and persisted to its own JSON snapshot file, the same
/// load-on-start / write-through-on-mutate shape the teacher's
/// `ScheduleStore` uses for its single resource.
pub struct ResourceStore {
    dir: PathBuf,
    tasks: RwLock<HashMap<String, Task>>,
    runs: RwLock<HashMap<String, Run>>,
    events: RwLock<HashMap<String, Vec<Event>>>,
    nodes: RwLock<HashMap<String, Node>>,
    accounts: RwLock<HashMap<String, Account>>,
    instances: RwLock<HashMap<String, Instance>>,
    terminal_sessions: RwLock<HashMap<String, TerminalSession>>,
    proxies: RwLock<HashMap<String, Proxy>>,
}

fn load_map<T: Clone + serde::de::DeserializeOwned>(path: &Path) -> HashMap<String, T>
where
    T: KeyedResource,
{
    let Ok(data) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    match serde_json::from_str::<Vec<T>>(&data) {
        Ok(items) => items.into_iter().map(|i| (i.key(), i)).collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse store snapshot, starting empty");
            HashMap::new()
        }
    }
}

trait KeyedResource {
    fn key(&self) -> String;
}

impl KeyedResource for Task {
    fn key(&self) -> String {
        self.id.clone()
    }
}
impl KeyedResource for Run {
    fn key(&self) -> String {
        self.id.clone()
    }
}
impl KeyedResource for Node {
    fn key(&self) -> String {
        self.id.clone()
    }
}
impl KeyedResource for Account {
    fn key(&self) -> String {
        self.id.clone()
    }
}
impl KeyedResource for Instance {
    fn key(&self) -> String {
        self.id.clone()
    }
}
impl KeyedResource for TerminalSession {
    fn key(&self) -> String {
        self.id.clone()
    }
}
impl KeyedResource for Proxy {
    fn key(&self) -> String {
        self.id.clone()
    }
}

fn persist_map<T: Clone + serde::Serialize>(path: &Path, items: Vec<T>) {
    match serde_json::to_string_pretty(&items) {
        Ok(json) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(path, json) {
                tracing::warn!(path = %path.display(), error = %e, "failed to persist store snapshot");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize store snapshot"),
    }
}

impl ResourceStore {
    /// Load (or start empty) from `dir`, one JSON file per resource kind.
    pub fn open(dir: impl Into<PathBuf>) -> Arc<Self> {
        let dir = dir.into();
        let tasks = load_map(&dir.join("tasks.json"));
        let runs = load_map(&dir.join("runs.json"));
        let nodes = load_map(&dir.join("nodes.json"));
        let accounts = load_map(&dir.join("accounts.json"));
        let instances = load_map(&dir.join("instances.json"));
        let terminal_sessions = load_map(&dir.join("terminal_sessions.json"));
        let proxies = load_map(&dir.join("proxies.json"));

        let events: HashMap<String, Vec<Event>> = std::fs::read_to_string(dir.join("events.json"))
            .ok()
            .and_then(|s| serde_json::from_str::<Vec<Event>>(&s).ok())
            .map(|flat| {
                let mut by_run: HashMap<String, Vec<Event>> = HashMap::new();
                for e in flat {
                    by_run.entry(e.run_id.clone()).or_default().push(e);
                }
                for v in by_run.values_mut() {
                    v.sort_by_key(|e| e.seq);
                }
                by_run
            })
            .unwrap_or_default();

        Arc::new(Self {
            dir,
            tasks: RwLock::new(tasks),
            runs: RwLock::new(runs),
            events: RwLock::new(events),
            nodes: RwLock::new(nodes),
            accounts: RwLock::new(accounts),
            instances: RwLock::new(instances),
            terminal_sessions: RwLock::new(terminal_sessions),
            proxies: RwLock::new(proxies),
        })
    }

    fn persist_tasks(&self) {
        let items: Vec<Task> = self.tasks.read().values().cloned().collect();
        persist_map(&self.dir.join("tasks.json"), items);
    }
    fn persist_runs(&self) {
        let items: Vec<Run> = self.runs.read().values().cloned().collect();
        persist_map(&self.dir.join("runs.json"), items);
    }
    fn persist_events(&self) {
        let items: Vec<Event> = self
            .events
            .read()
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect();
        persist_map(&self.dir.join("events.json"), items);
    }
    fn persist_nodes(&self) {
        let items: Vec<Node> = self.nodes.read().values().cloned().collect();
        persist_map(&self.dir.join("nodes.json"), items);
    }
    fn persist_accounts(&self) {
        let items: Vec<Account> = self.accounts.read().values().cloned().collect();
        persist_map(&self.dir.join("accounts.json"), items);
    }
    fn persist_instances(&self) {
        let items: Vec<Instance> = self.instances.read().values().cloned().collect();
        persist_map(&self.dir.join("instances.json"), items);
    }
    fn persist_terminal_sessions(&self) {
        let items: Vec<TerminalSession> =
            self.terminal_sessions.read().values().cloned().collect();
        persist_map(&self.dir.join("terminal_sessions.json"), items);
    }
    fn persist_proxies(&self) {
        let items: Vec<Proxy> = self.proxies.read().values().cloned().collect();
        persist_map(&self.dir.join("proxies.json"), items);
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn create_task(&self, task: Task) -> Task {
        self.tasks.write().insert(task.id.clone(), task.clone());
        self.persist_tasks();
        task
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.read().get(id).cloned()
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.read().values().cloned().collect()
    }

    pub fn update_task<F: FnOnce(&mut Task)>(&self, id: &str, f: F) -> Option<Task> {
        let updated = {
            let mut guard = self.tasks.write();
            let task = guard.get_mut(id)?;
            f(task);
            task.updated_at = chrono::Utc::now();
            task.clone()
        };
        self.persist_tasks();
        Some(updated)
    }

    /// Cascade delete (§3 invariant ii): removes the task, its runs, and
    /// their events.
    pub fn delete_task(&self, id: &str) -> bool {
        let existed = self.tasks.write().remove(id).is_some();
        if existed {
            let run_ids: Vec<String> = {
                let guard = self.runs.read();
                guard
                    .values()
                    .filter(|r| r.task_id == id)
                    .map(|r| r.id.clone())
                    .collect()
            };
            for run_id in &run_ids {
                self.runs.write().remove(run_id);
                self.events.write().remove(run_id);
            }
            self.persist_tasks();
            self.persist_runs();
            self.persist_events();
        }
        existed
    }

    // ── Runs ─────────────────────────────────────────────────────────

    pub fn create_run(&self, run: Run) -> Run {
        self.runs.write().insert(run.id.clone(), run.clone());
        self.persist_runs();
        run
    }

    pub fn get_run(&self, id: &str) -> Option<Run> {
        self.runs.read().get(id).cloned()
    }

    pub fn list_runs(&self) -> Vec<Run> {
        self.runs.read().values().cloned().collect()
    }

    pub fn list_runs_by_status(&self, status: RunStatus) -> Vec<Run> {
        self.runs
            .read()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    pub fn list_runs_for_task(&self, task_id: &str) -> Vec<Run> {
        self.runs
            .read()
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn list_runs_for_node(&self, node_id: &str) -> Vec<Run> {
        self.runs
            .read()
            .values()
            .filter(|r| r.node_id.as_deref() == Some(node_id))
            .cloned()
            .collect()
    }

    pub fn count_running_for_node(&self, node_id: &str) -> usize {
        self.runs
            .read()
            .values()
            .filter(|r| r.status == RunStatus::Running && r.node_id.as_deref() == Some(node_id))
            .count()
    }

    pub fn update_run<F: FnOnce(&mut Run)>(&self, id: &str, f: F) -> Option<Run> {
        let updated = {
            let mut guard = self.runs.write();
            let run = guard.get_mut(id)?;
            f(run);
            run.updated_at = chrono::Utc::now();
            run.clone()
        };
        self.persist_runs();
        Some(updated)
    }

    /// Drive the §4.3 task-status propagator: mirror a run's new status
    /// onto its parent task, respecting "don't clobber an already-terminal
    /// task with a stale transition" only where the spec requires it (a
    /// new run against a completed task is explicitly allowed to flip it
    /// back to running).
    pub fn propagate_task_status(&self, task_id: &str, run_status: RunStatus) {
        let new_status = match run_status {
            RunStatus::Running => Some(TaskStatus::Running),
            RunStatus::Done => Some(TaskStatus::Completed),
            RunStatus::Failed => Some(TaskStatus::Failed),
            RunStatus::Cancelled => Some(TaskStatus::Cancelled),
            RunStatus::Timeout => Some(TaskStatus::Failed),
            RunStatus::Queued => None,
        };
        if let Some(status) = new_status {
            self.update_task(task_id, |t| t.status = status);
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Append a batch of events, skipping any `(run_id, seq)` already
    /// present — the idempotence law (§8): a retried batch is a no-op.
    /// Returns the events actually appended (for fan-out).
    pub fn append_events(&self, run_id: &str, batch: Vec<Event>) -> Vec<Event> {
        let mut appended = Vec::new();
        {
            let mut guard = self.events.write();
            let list = guard.entry(run_id.to_string()).or_default();
            let existing: std::collections::HashSet<u64> = list.iter().map(|e| e.seq).collect();
            for event in batch {
                if !existing.contains(&event.seq) {
                    list.push(event.clone());
                    appended.push(event);
                }
            }
            list.sort_by_key(|e| e.seq);
        }
        if !appended.is_empty() {
            self.persist_events();
        }
        appended
    }

    pub fn has_events(&self, run_id: &str) -> bool {
        self.events
            .read()
            .get(run_id)
            .is_some_and(|v| !v.is_empty())
    }

    pub fn events_after(&self, run_id: &str, from_seq: u64, limit: usize) -> Vec<Event> {
        self.events
            .read()
            .get(run_id)
            .map(|v| {
                v.iter()
                    .filter(|e| e.seq > from_seq)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Nodes ────────────────────────────────────────────────────────

    pub fn upsert_node(&self, node: Node) -> Node {
        self.nodes.write().insert(node.id.clone(), node.clone());
        self.persist_nodes();
        node
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.read().get(id).cloned()
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn update_node<F: FnOnce(&mut Node)>(&self, id: &str, f: F) -> Option<Node> {
        let updated = {
            let mut guard = self.nodes.write();
            let node = guard.get_mut(id)?;
            f(node);
            node.clone()
        };
        self.persist_nodes();
        Some(updated)
    }

    // ── Accounts ─────────────────────────────────────────────────────

    pub fn create_account(&self, account: Account) -> Account {
        self.accounts
            .write()
            .insert(account.id.clone(), account.clone());
        self.persist_accounts();
        account
    }

    pub fn get_account(&self, id: &str) -> Option<Account> {
        self.accounts.read().get(id).cloned()
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.accounts.read().values().cloned().collect()
    }

    pub fn update_account<F: FnOnce(&mut Account)>(&self, id: &str, f: F) -> Option<Account> {
        let updated = {
            let mut guard = self.accounts.write();
            let account = guard.get_mut(id)?;
            f(account);
            account.clone()
        };
        self.persist_accounts();
        Some(updated)
    }

    pub fn delete_account(&self, id: &str) -> bool {
        let existed = self.accounts.write().remove(id).is_some();
        if existed {
            self.persist_accounts();
        }
        existed
    }

    // ── Instances ────────────────────────────────────────────────────

    pub fn create_instance(&self, instance: Instance) -> Instance {
        self.instances
            .write()
            .insert(instance.id.clone(), instance.clone());
        self.persist_instances();
        instance
    }

    pub fn get_instance(&self, id: &str) -> Option<Instance> {
        self.instances.read().get(id).cloned()
    }

    pub fn list_instances(&self) -> Vec<Instance> {
        self.instances.read().values().cloned().collect()
    }

    pub fn list_instances_for_node(&self, node_id: &str) -> Vec<Instance> {
        self.instances
            .read()
            .values()
            .filter(|i| i.node_id == node_id)
            .cloned()
            .collect()
    }

    pub fn update_instance<F: FnOnce(&mut Instance)>(&self, id: &str, f: F) -> Option<Instance> {
        let updated = {
            let mut guard = self.instances.write();
            let instance = guard.get_mut(id)?;
            f(instance);
            instance.updated_at = chrono::Utc::now();
            instance.clone()
        };
        self.persist_instances();
        Some(updated)
    }

    pub fn delete_instance(&self, id: &str) -> bool {
        let existed = self.instances.write().remove(id).is_some();
        if existed {
            self.persist_instances();
        }
        existed
    }

    // ── Terminal sessions ────────────────────────────────────────────

    pub fn create_terminal_session(&self, session: TerminalSession) -> TerminalSession {
        self.terminal_sessions
            .write()
            .insert(session.id.clone(), session.clone());
        self.persist_terminal_sessions();
        session
    }

    pub fn get_terminal_session(&self, id: &str) -> Option<TerminalSession> {
        self.terminal_sessions.read().get(id).cloned()
    }

    pub fn list_terminal_sessions_for_node(&self, node_id: &str) -> Vec<TerminalSession> {
        self.terminal_sessions
            .read()
            .values()
            .filter(|t| t.node_id == node_id)
            .cloned()
            .collect()
    }

    pub fn update_terminal_session<F: FnOnce(&mut TerminalSession)>(
        &self,
        id: &str,
        f: F,
    ) -> Option<TerminalSession> {
        let updated = {
            let mut guard = self.terminal_sessions.write();
            let session = guard.get_mut(id)?;
            f(session);
            session.clone()
        };
        self.persist_terminal_sessions();
        Some(updated)
    }

    // ── Proxies ──────────────────────────────────────────────────────

    pub fn create_proxy(&self, proxy: Proxy) -> Proxy {
        self.proxies.write().insert(proxy.id.clone(), proxy.clone());
        self.persist_proxies();
        proxy
    }

    pub fn list_proxies(&self) -> Vec<Proxy> {
        self.proxies.read().values().cloned().collect()
    }

    pub fn delete_proxy(&self, id: &str) -> bool {
        let existed = self.proxies.write().remove(id).is_some();
        if existed {
            self.persist_proxies();
        }
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_domain::task::{AgentSpec, TaskSecurity, TaskSpec};

    fn spec() -> TaskSpec {
        TaskSpec {
            prompt: "hi".into(),
            workspace: None,
            security: TaskSecurity::default(),
            agent: AgentSpec::default(),
        }
    }

    #[test]
    fn cascade_delete_removes_runs_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());

        let task = store.create_task(Task::new("t".into(), spec()));
        let run = store.create_run(Run::new(task.id.clone(), spec()));
        store.append_events(
            &run.id,
            vec![Event::new(
                run.id.clone(),
                1,
                af_domain::CanonicalEventType::RunStarted,
                serde_json::Value::Null,
            )],
        );

        assert!(store.delete_task(&task.id));
        assert!(store.get_run(&run.id).is_none());
        assert!(store.events_after(&run.id, 0, 10).is_empty());
    }

    #[test]
    fn event_batch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::open(dir.path());
        let e = Event::new(
            "run-1".into(),
            1,
            af_domain::CanonicalEventType::RunStarted,
            serde_json::Value::Null,
        );
        let first = store.append_events("run-1", vec![e.clone()]);
        let second = store.append_events("run-1", vec![e]);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
        assert_eq!(store.events_after("run-1", 0, 10).len(), 1);
    }

    #[test]
    fn reopening_loads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let task_id = {
            let store = ResourceStore::open(dir.path());
            store.create_task(Task::new("t".into(), spec())).id
        };
        let store = ResourceStore::open(dir.path());
        assert!(store.get_task(&task_id).is_some());
    }
}
