use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
};

use crate::{
    error::{HarnessError, Result},
    runner::command::CommandLine,
};

/// Captured output of one finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a command line to completion.
///
/// A non-zero exit code is not an error: it comes back inside the
/// [`ExecutionResult`]. Implementations must fail with
/// [`HarnessError::ExecutionTimeout`] when `timeout` elapses and must not
/// leave the process running in that case.
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, cmd: &CommandLine, timeout: Duration) -> Result<ExecutionResult>;
}

/// Spawns exactly one OS process per call, never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Execute for ProcessExecutor {
    async fn execute(&self, cmd: &CommandLine, timeout: Duration) -> Result<ExecutionResult> {
        let failure = |cause: std::io::Error| HarnessError::ExecutionFailure {
            command: cmd.to_string(),
            cause,
        };

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(dir) = &cmd.workdir {
            command.current_dir(dir);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(failure)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| failure(std::io::Error::other("stdout unavailable")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| failure(std::io::Error::other("stderr unavailable")))?;

        let mut stdout_task = tokio::spawn(read_stream(stdout));
        let mut stderr_task = tokio::spawn(read_stream(stderr));

        // The deadline covers draining the pipes too: a helper process can
        // keep them open after the direct child has exited.
        let finished = tokio::time::timeout(timeout, async {
            let status = child.wait().await?;
            let stdout = join_stream(&mut stdout_task).await?;
            let stderr = join_stream(&mut stderr_task).await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(output) => output.map_err(failure)?,
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(HarnessError::ExecutionTimeout {
                    command: cmd.to_string(),
                    timeout,
                });
            }
        };

        let exit_code = status.code().ok_or_else(|| {
            failure(std::io::Error::other(format!(
                "process terminated abnormally ({status})"
            )))
        })?;

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
        })
    }
}

async fn read_stream(mut stream: impl AsyncRead + Unpin) -> std::io::Result<String> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn join_stream(task: &mut JoinHandle<std::io::Result<String>>) -> std::io::Result<String> {
    task.await.map_err(std::io::Error::other)?
}
