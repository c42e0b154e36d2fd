//! §4.4 AuthSession reconciler — the OAuth/device-code driver. Only the
//! `oauth` method exists today; other `method` values are left untouched so
//! a future driver can claim them without this loop racing it.

use std::collections::HashMap;
use std::time::Duration;

use af_container_rt::exec_stream::ExecLine;
use af_protocol::node_facing::AuthTaskPatch;
use af_protocol::AuthTaskWire;
use chrono::Utc;
use regex::Regex;

use crate::state::NodeState;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const AUTH_MOUNT: &str = "/root/.af-auth";
const CREDENTIAL_FILE: &str = "/root/.af-auth/credentials.json";

struct RunningAuth {
    handle: af_container_rt::exec_stream::ExecHandle,
    container_name: String,
    volume_name: String,
}

pub async fn run(state: NodeState) {
    let mut live: HashMap<String, RunningAuth> = HashMap::new();
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                for (_, auth) in live.drain() {
                    auth.handle.kill().await;
                }
                return;
            }
            _ = interval.tick() => reconcile_once(&state, &mut live).await,
        }
    }
}

async fn reconcile_once(state: &NodeState, live: &mut HashMap<String, RunningAuth>) {
    let tasks = match state.gateway.auth_tasks_for_node(state.node_id()).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to poll auth tasks");
            return;
        }
    };

    for task in &tasks {
        if task.method != "oauth" {
            continue;
        }
        if let Err(e) = step(state, task, live).await {
            tracing::warn!(task_id = %task.task_id, error = %e, "auth session step failed");
            live.remove(&task.task_id);
            let _ = state
                .gateway
                .patch_auth_task(
                    &task.task_id,
                    &AuthTaskPatch {
                        status: Some("failed".to_string()),
                        executed: Some(true),
                        message: Some(e.to_string()),
                        ..Default::default()
                    },
                )
                .await;
        }
    }
}

async fn step(
    state: &NodeState,
    task: &AuthTaskWire,
    live: &mut HashMap<String, RunningAuth>,
) -> anyhow::Result<()> {
    if task.expires_at <= Utc::now() && !matches!(task.status.as_str(), "success" | "failed" | "timeout") {
        if let Some(auth) = live.remove(&task.task_id) {
            auth.handle.kill().await;
        }
        state
            .gateway
            .patch_auth_task(
                &task.task_id,
                &AuthTaskPatch {
                    status: Some("timeout".to_string()),
                    executed: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        return Ok(());
    }

    match task.status.as_str() {
        "assigned" if !task.executed => start(state, task, live).await,
        "running" | "waiting_oauth" => poll_live(state, task, live).await,
        _ => Ok(()),
    }
}

/// Steps 1–3: ensure the volume, launch the disposable login container,
/// watch stdout for the verification URL and device code.
async fn start(
    state: &NodeState,
    task: &AuthTaskWire,
    live: &mut HashMap<String, RunningAuth>,
) -> anyhow::Result<()> {
    let volume_name = format!("af-account-vol-{}", task.account_id);
    state.runtime.volume_create(&volume_name).await?;

    let image = format!("af-agents/{}:latest", task.agent_type_id);
    let container_name = format!("af-auth-{}", task.task_id);
    let spec = af_container_rt::CreateSpec::new(container_name.clone(), image)
        .with_volume(&volume_name, AUTH_MOUNT)
        .with_env("AF_AUTH_DIR", AUTH_MOUNT);
    state.runtime.create(&spec).await?;
    state.runtime.start(&container_name).await?;

    let command = login_command(&task.agent_type_id);
    let handle = state
        .runtime
        .exec_stream(&container_name, command[0], &command[1..].iter().map(|s| s.to_string()).collect::<Vec<_>>())?;

    state
        .gateway
        .patch_auth_task(
            &task.task_id,
            &AuthTaskPatch {
                status: Some("running".to_string()),
                executed: Some(true),
                ..Default::default()
            },
        )
        .await?;

    live.insert(
        task.task_id.clone(),
        RunningAuth {
            handle,
            container_name,
            volume_name,
        },
    );
    Ok(())
}

/// Steps 3–5: drain buffered stdout for the url/code pair, then poll for
/// the credential file or process exit.
async fn poll_live(
    state: &NodeState,
    task: &AuthTaskWire,
    live: &mut HashMap<String, RunningAuth>,
) -> anyhow::Result<()> {
    let Some(auth) = live.get_mut(&task.task_id) else {
        // process isn't ours (e.g. after a node-manager restart) — there is
        // no handle to drain, just watch for the credential file.
        return check_success(state, task, None).await;
    };

    let url_re = Regex::new(r"https?://\S+").unwrap();
    let code_re = Regex::new(r"(?i)(?:code|device code)[:\s]+([A-Z0-9-]{4,})").unwrap();
    let mut verify_url = None;
    let mut user_code = None;

    while let Ok(line) = auth.handle.lines.try_recv() {
        if let ExecLine::Stdout(text) = line {
            if verify_url.is_none() {
                verify_url = url_re.find(&text).map(|m| m.as_str().to_string());
            }
            if user_code.is_none() {
                user_code = code_re
                    .captures(&text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string());
            }
        }
    }

    if task.status == "running" && (verify_url.is_some() || user_code.is_some()) {
        state
            .gateway
            .patch_auth_task(
                &task.task_id,
                &AuthTaskPatch {
                    status: Some("waiting_oauth".to_string()),
                    oauth_url: verify_url,
                    user_code,
                    ..Default::default()
                },
            )
            .await?;
    }

    let container_name = auth.container_name.clone();
    let volume_name = auth.volume_name.clone();
    check_success(state, task, Some((&container_name, &volume_name))).await
}

async fn check_success(
    state: &NodeState,
    task: &AuthTaskWire,
    container: Option<(&str, &str)>,
) -> anyhow::Result<()> {
    let Some((container_name, volume_name)) = container else {
        return Ok(());
    };

    if state.runtime.file_exists_in(container_name, CREDENTIAL_FILE).await? {
        state
            .gateway
            .patch_auth_task(
                &task.task_id,
                &AuthTaskPatch {
                    status: Some("success".to_string()),
                    executed: Some(true),
                    volume_name: Some(volume_name.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        state.runtime.rm(container_name).await.ok();
        return Ok(());
    }

    if !state.runtime.is_running(container_name).await? {
        state
            .gateway
            .patch_auth_task(
                &task.task_id,
                &AuthTaskPatch {
                    status: Some("failed".to_string()),
                    executed: Some(true),
                    message: Some("login process exited without producing credentials".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        state.runtime.rm(container_name).await.ok();
    }

    Ok(())
}

fn login_command(agent_type_id: &str) -> Vec<&'static str> {
    match agent_type_id {
        "qwen-code" | "qwen" => vec!["qwen-code", "login", "--device-code"],
        "gemini-cli" | "gemini" => vec!["gemini", "auth", "login"],
        _ => vec!["claude", "login"],
    }
}
