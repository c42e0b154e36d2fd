use std::collections::HashMap;

use tokio::process::Command;

use crate::error::ContainerError;
use crate::exec_stream::ExecHandle;

/// Parameters for creating a container. `labels` always carries
/// `managed=true` so the reconciler's orphan GC can find containers it owns
/// without tracking every name it has ever created.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub volumes: Vec<(String, String)>,
    pub labels: HashMap<String, String>,
    pub network: Option<String>,
}

impl CreateSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        let mut labels = HashMap::new();
        labels.insert("managed".to_string(), "true".to_string());
        Self {
            name: name.into(),
            image: image.into(),
            env: HashMap::new(),
            volumes: Vec::new(),
            labels,
            network: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_volume(mut self, host_or_name: impl Into<String>, container_path: impl Into<String>) -> Self {
        self.volumes.push((host_or_name.into(), container_path.into()));
        self
    }
}

/// Thin wrapper around a docker-CLI-compatible binary. Every method shells
/// out and waits for the child to exit; long-running work (agent CLI
/// invocations whose stdout must be consumed incrementally) goes through
/// `exec_stream` instead.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    binary: String,
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    async fn run(&self, args: &[&str]) -> Result<String, ContainerError> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = cmd.output().await.map_err(|source| ContainerError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ContainerError::NonZeroExit {
                command: format!("{} {}", self.binary, args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `docker create` — long-lived containers bound to an account (§3, §4.4).
    /// Idempotent: a create against a name that already exists returns that
    /// container's existing status rather than erroring, matching the
    /// "leaves state running, does not launch a duplicate" testable property.
    pub async fn create(&self, spec: &CreateSpec) -> Result<String, ContainerError> {
        if self.exists(&spec.name).await? {
            return Ok(spec.name.clone());
        }

        let mut args: Vec<String> = vec![
            "create".into(),
            "--name".into(),
            spec.name.clone(),
        ];
        for (k, v) in &spec.env {
            args.push("-e".into());
            args.push(format!("{k}={v}"));
        }
        for (src, dst) in &spec.volumes {
            args.push("-v".into());
            args.push(format!("{src}:{dst}"));
        }
        for (k, v) in &spec.labels {
            args.push("-l".into());
            args.push(format!("{k}={v}"));
        }
        if let Some(net) = &spec.network {
            args.push("--network".into());
            args.push(net.clone());
        }
        args.push(spec.image.clone());

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs).await
    }

    pub async fn start(&self, name: &str) -> Result<(), ContainerError> {
        self.run(&["start", name]).await.map(|_| ())
    }

    pub async fn stop(&self, name: &str) -> Result<(), ContainerError> {
        self.run(&["stop", name]).await.map(|_| ())
    }

    /// `docker rm -f`. Idempotent delete: not-found is not an error here —
    /// callers that need "did it exist" semantics should call `exists` first.
    pub async fn rm(&self, name: &str) -> Result<(), ContainerError> {
        match self.run(&["rm", "-f", name]).await {
            Ok(_) => Ok(()),
            Err(ContainerError::NonZeroExit { stderr, .. }) if stderr.contains("No such container") => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, ContainerError> {
        match self.run(&["inspect", "--format", "{{.Id}}", name]).await {
            Ok(_) => Ok(true),
            Err(ContainerError::NonZeroExit { stderr, .. }) if stderr.contains("No such") => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn is_running(&self, name: &str) -> Result<bool, ContainerError> {
        match self.run(&["inspect", "--format", "{{.State.Running}}", name]).await {
            Ok(out) => Ok(out == "true"),
            Err(ContainerError::NonZeroExit { stderr, .. }) if stderr.contains("No such") => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn cp(&self, src: &str, dst: &str) -> Result<(), ContainerError> {
        self.run(&["cp", src, dst]).await.map(|_| ())
    }

    pub async fn volume_create(&self, name: &str) -> Result<(), ContainerError> {
        match self.run(&["volume", "create", name]).await {
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn volume_rm(&self, name: &str) -> Result<(), ContainerError> {
        match self.run(&["volume", "rm", "-f", name]).await {
            Ok(_) => Ok(()),
            Err(ContainerError::NonZeroExit { stderr, .. }) if stderr.contains("no such volume") => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn image_of(&self, name: &str) -> Result<String, ContainerError> {
        self.run(&["inspect", "--format", "{{.Config.Image}}", name]).await
    }

    /// Check for a file inside a running container without shelling out to
    /// `exec_stream` (used by the OAuth driver to poll for the credential
    /// file the login command writes on success).
    pub async fn file_exists_in(&self, name: &str, path: &str) -> Result<bool, ContainerError> {
        match self.run(&["exec", name, "test", "-f", path]).await {
            Ok(_) => Ok(true),
            Err(ContainerError::NonZeroExit { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List containers carrying `managed=true`, for orphan GC.
    pub async fn list_managed(&self) -> Result<Vec<String>, ContainerError> {
        let out = self
            .run(&["ps", "-a", "--filter", "label=managed=true", "--format", "{{.Names}}"])
            .await?;
        Ok(out.lines().map(str::to_string).filter(|s| !s.is_empty()).collect())
    }

    /// `docker exec` with a live, line-buffered stdout — the node manager's
    /// run execution (§4.5) consumes this to parse NDJSON into canonical
    /// events as they arrive rather than after the process exits.
    pub fn exec_stream(&self, name: &str, command: &str, args: &[String]) -> Result<ExecHandle, ContainerError> {
        let mut full_args = vec!["exec".to_string(), name.to_string(), command.to_string()];
        full_args.extend(args.iter().cloned());
        ExecHandle::spawn(&self.binary, full_args)
    }
}
