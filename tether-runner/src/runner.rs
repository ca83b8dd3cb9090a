use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use tether_core::{Outcome, ProcessResult, ProcessSpec, Result, TetherError};

use crate::kill;

/// Executes one external process under a wall-clock bound.
///
/// Each call owns its process handle and pipes exclusively; concurrent
/// calls share no state, so the runner is a cheap value to clone.
#[derive(Debug, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run the process described by `spec` to a definitive [`Outcome`].
    ///
    /// Expected failures (non-zero exit, timeout, unlaunchable program) are
    /// encoded in the returned result; `Err` is reserved for environment
    /// faults inside the harness itself. The process handle, its pipes, and
    /// any descendants are released before this returns, on every path.
    pub async fn execute(&self, spec: &ProcessSpec) -> Result<ProcessResult> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            execution_id = %id,
            program = %spec.program,
            args = ?spec.args,
            "Starting process execution"
        );

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        // Own process group, so a timeout can signal the whole tree at once.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    execution_id = %id,
                    program = %spec.program,
                    error = %e,
                    "Failed to launch process"
                );
                let outcome = Outcome::LaunchFailed {
                    cause: e.to_string(),
                };
                return Ok(assemble(id, started_at, start, outcome, Vec::new(), Vec::new()));
            }
        };

        // Both pipes must be drained while the exit-wait is in flight:
        // kernel pipe buffers are bounded, and a child that fills one
        // stream while the harness reads only the other stalls both sides
        // for good.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let outcome = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => completed(status, &mut child).await?,
                Err(_) => {
                    warn!(
                        execution_id = %id,
                        timeout_ms = limit.as_millis() as u64,
                        "Process exceeded timeout, terminating process tree"
                    );
                    kill::terminate_tree(&mut child).await;
                    // Reap, so no zombie outlives the call.
                    let _ = child.wait().await;
                    Outcome::TimedOut
                }
            },
            None => {
                let status = child.wait().await;
                completed(status, &mut child).await?
            }
        };

        // Output is only final once both drains hit end-of-stream. After a
        // tree kill that is guaranteed: no descendant holds the write ends
        // open any more.
        let stdout = join_drain(stdout_task).await?;
        let stderr = join_drain(stderr_task).await?;

        let result = assemble(id, started_at, start, outcome, stdout, stderr);

        info!(
            execution_id = %id,
            outcome = ?result.outcome,
            duration_ms = result.duration_ms,
            stderr_had_output = result.stderr_had_output,
            "Process execution completed"
        );

        Ok(result)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one pipe to end-of-stream on its own task.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error ends the capture; whatever arrived is kept.
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn join_drain(task: JoinHandle<Vec<u8>>) -> Result<Vec<u8>> {
    task.await
        .map_err(|e| TetherError::Execution(format!("stream capture task failed: {e}")))
}

async fn completed(status: std::io::Result<ExitStatus>, child: &mut Child) -> Result<Outcome> {
    match status {
        // A signal-killed child carries no exit code; report -1.
        Ok(status) => Ok(Outcome::Completed {
            exit_code: status.code().unwrap_or(-1),
        }),
        Err(e) => {
            // The wait itself failed. Make sure nothing survives before
            // giving up.
            kill::terminate_tree(child).await;
            Err(TetherError::IoError(e))
        }
    }
}

fn assemble(
    id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
    outcome: Outcome,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
) -> ProcessResult {
    let stdout = String::from_utf8_lossy(&stdout).to_string();
    let stderr = String::from_utf8_lossy(&stderr).to_string();
    let stderr_had_output = !stderr.trim().is_empty();

    ProcessResult {
        id,
        outcome,
        stdout,
        stderr,
        stderr_had_output,
        duration_ms: start.elapsed().as_millis() as u64,
        started_at,
        completed_at: Some(Utc::now()),
    }
}
