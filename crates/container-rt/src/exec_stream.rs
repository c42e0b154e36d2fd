use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::ContainerError;

/// One line of output from an `exec_stream`, tagged by which file descriptor
/// it came from so callers can route stdout to event parsing and stderr to
/// logging, same split as the teacher's exec-tool monitor.
#[derive(Debug, Clone)]
pub enum ExecLine {
    Stdout(String),
    Stderr(String),
}

/// A running `exec` invocation. Lines arrive on `lines` as they're printed;
/// `kill` lets the caller tear the process down early (run cancellation);
/// `wait` resolves to the exit status once the child and its readers have
/// finished.
pub struct ExecHandle {
    pub lines: mpsc::Receiver<ExecLine>,
    kill_tx: mpsc::Sender<()>,
    exit_rx: mpsc::Receiver<Result<Option<i32>, ContainerError>>,
}

impl ExecHandle {
    pub(crate) fn spawn(binary: impl Into<String>, args: Vec<String>) -> Result<Self, ContainerError> {
        let binary = binary.into();
        let mut cmd = Command::new(&binary);
        cmd.args(&args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        let mut child = cmd.spawn().map_err(|source| ContainerError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (line_tx, line_rx) = mpsc::channel::<ExecLine>(256);
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let (exit_tx, exit_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let out_tx = line_tx.clone();
            let stdout_task = tokio::spawn(async move {
                if let Some(stdout) = stdout {
                    let mut reader = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = reader.next_line().await {
                        if out_tx.send(ExecLine::Stdout(line)).await.is_err() {
                            break;
                        }
                    }
                }
            });

            let err_tx = line_tx.clone();
            let stderr_task = tokio::spawn(async move {
                if let Some(stderr) = stderr {
                    let mut reader = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = reader.next_line().await {
                        if err_tx.send(ExecLine::Stderr(line)).await.is_err() {
                            break;
                        }
                    }
                }
            });
            drop(line_tx);

            let result = tokio::select! {
                status = child.wait() => {
                    status.map(|s| s.code()).map_err(|e| ContainerError::NonZeroExit {
                        command: binary.to_string(),
                        code: None,
                        stderr: e.to_string(),
                    })
                }
                _ = kill_rx.recv() => {
                    let _ = child.kill().await;
                    Ok(None)
                }
            };

            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let _ = exit_tx.send(result).await;
        });

        Ok(Self {
            lines: line_rx,
            kill_tx,
            exit_rx,
        })
    }

    pub async fn kill(&self) {
        let _ = self.kill_tx.send(()).await;
    }

    /// Resolve once the process has exited (or been killed). `None` means
    /// the process was killed before producing an exit code.
    pub async fn wait(mut self) -> Result<Option<i32>, ContainerError> {
        self.exit_rx.recv().await.unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_stdout_lines_in_order() {
        let mut handle = ExecHandle::spawn(
            "sh",
            vec!["-c".into(), "echo one; echo two; echo three".into()],
        )
        .unwrap();

        let mut seen = Vec::new();
        while let Some(line) = handle.lines.recv().await {
            if let ExecLine::Stdout(s) = line {
                seen.push(s);
            }
        }
        let status = handle.wait().await.unwrap();
        assert_eq!(status, Some(0));
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn kill_stops_a_long_running_process() {
        let handle = ExecHandle::spawn("sh", vec!["-c".into(), "sleep 30".into()]).unwrap();
        handle.kill().await;
        let status = handle.wait().await.unwrap();
        assert_eq!(status, None);
    }
}
