//! §4.5 step 3: workspace preparation before a run's command executes.

use af_container_rt::{ContainerError, ContainerRuntime};
use af_protocol::run_snapshot::WorkspaceSpecWire;
use serde_json::{json, Value};

/// A short audit summary of what was prepared, posted in the `run_started`
/// event payload (§4.5 step 4).
pub async fn prepare(
    runtime: &ContainerRuntime,
    workspace_root: &std::path::Path,
    container_name: &str,
    run_id: &str,
    spec: &Option<WorkspaceSpecWire>,
) -> Result<Value, ContainerError> {
    let Some(spec) = spec else {
        return Ok(json!({ "kind": "none" }));
    };

    match spec {
        WorkspaceSpecWire::Git { url, branch, commit } => {
            let checkout_dir = workspace_root.join(run_id);
            clone_git(url, branch.as_deref(), commit.as_deref(), &checkout_dir).await?;
            runtime
                .cp(&checkout_dir.to_string_lossy(), &format!("{container_name}:/workspace"))
                .await?;
            Ok(json!({
                "kind": "git",
                "url": url,
                "branch": branch,
                "commit": commit,
            }))
        }
        WorkspaceSpecWire::LocalPath { path } => {
            if !std::path::Path::new(path).exists() {
                return Err(ContainerError::NotFound(path.clone()));
            }
            Ok(json!({ "kind": "local_path", "path": path }))
        }
        WorkspaceSpecWire::Volume { name } => {
            runtime.volume_create(name).await?;
            Ok(json!({ "kind": "volume", "name": name }))
        }
    }
}

async fn clone_git(
    url: &str,
    branch: Option<&str>,
    commit: Option<&str>,
    dest: &std::path::Path,
) -> Result<(), ContainerError> {
    let _ = tokio::fs::remove_dir_all(dest).await;
    let mut args: Vec<String> = vec!["clone".into(), "--depth".into(), "1".into()];
    if let Some(branch) = branch {
        args.push("--branch".into());
        args.push(branch.to_string());
    }
    args.push(url.to_string());
    args.push(dest.to_string_lossy().into_owned());

    let status = tokio::process::Command::new("git")
        .args(&args)
        .status()
        .await
        .map_err(|source| ContainerError::Spawn {
            binary: "git".to_string(),
            source,
        })?;
    if !status.success() {
        return Err(ContainerError::NonZeroExit {
            command: format!("git {}", args.join(" ")),
            code: status.code(),
            stderr: "git clone failed".to_string(),
        });
    }

    if let Some(commit) = commit {
        let status = tokio::process::Command::new("git")
            .args(["-C", &dest.to_string_lossy(), "checkout", commit])
            .status()
            .await
            .map_err(|source| ContainerError::Spawn {
                binary: "git".to_string(),
                source,
            })?;
        if !status.success() {
            return Err(ContainerError::NonZeroExit {
                command: format!("git checkout {commit}"),
                code: status.code(),
                stderr: "git checkout failed".to_string(),
            });
        }
    }

    Ok(())
}
