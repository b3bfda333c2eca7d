//! Monitored subprocess execution
//!
//! This module owns the full lifecycle of one external command: spawn,
//! register, drain output, estimate progress, enforce the timeout, and clean
//! up. The returned [`ExecutionResult`] is always well-formed — spawn
//! failures, timeouts, and external termination all land in its flags rather
//! than escaping as errors.
//!
//! ## Execution flow
//!
//! 1. The command runs under `sh -c` with both output streams piped; tools in
//!    this domain can emit large volumes for the whole timeout window, so
//!    nothing is buffered through the OS pipe beyond line granularity.
//! 2. The process is registered with the [`ProcessRegistry`] immediately
//!    after spawn, which makes it visible to control endpoints.
//! 3. Two drain tasks read stdout and stderr line by line, appending to
//!    in-memory buffers and forwarding each line to the log sink as read —
//!    live visibility into long scans.
//! 4. A progress task wakes on a fixed interval and publishes
//!    `elapsed / timeout` as the completion estimate until the process exits
//!    or the window closes.
//! 5. The caller's future blocks on process exit, the timeout, or external
//!    cancellation through the registry, whichever comes first.
//!
//! A command that times out but produced output is reported as a success
//! with `partial_results` set: most reconnaissance tools emit useful findings
//! long before they would finish naturally.

use crate::constants::{DRAIN_JOIN_TIMEOUT, KILL_GRACE};
use crate::error::EngineError;
use crate::process_registry::ProcessRegistry;
use crate::signals;
use crate::telemetry::TelemetryAggregator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Outcome of one command execution. Immutable once produced.
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    pub success: bool,
    pub timed_out: bool,
    /// Output was captured before the process was cut short by the timeout.
    pub partial_results: bool,
    /// Wall-clock duration in seconds.
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

enum WaitOutcome {
    Exited(i32),
    WaitFailed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn label(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Spawns and supervises one OS process per invocation.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    registry: Arc<ProcessRegistry>,
    telemetry: Arc<TelemetryAggregator>,
    progress_interval: Duration,
}

impl CommandExecutor {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        telemetry: Arc<TelemetryAggregator>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            registry,
            telemetry,
            progress_interval,
        }
    }

    /// Execute `command` with the given timeout.
    ///
    /// The command text is assumed pre-validated by the caller; this engine
    /// does not interpret shell syntax. A non-positive timeout yields a
    /// failed result rather than a panic.
    pub async fn execute(&self, command: &str, timeout: Duration) -> ExecutionResult {
        let started = Instant::now();

        if timeout.is_zero() {
            tracing::error!(command, "rejecting execution with zero timeout");
            return failure_result("timeout must be greater than zero", started);
        }

        tracing::info!(command, timeout_secs = timeout.as_secs_f64(), "executing command");

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let err = EngineError::Io(e);
                tracing::error!(command, category = err.category(), error = %err, "spawn failed");
                self.telemetry.record(false, started.elapsed().as_secs_f64());
                return failure_result(&format!("failed to spawn command: {err}"), started);
            }
        };

        // The pid is always available between spawn and wait.
        let pid = child.id().unwrap_or_default();
        let cancel = self.registry.register(pid, command).await;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let last_line = Arc::new(Mutex::new(String::new()));

        let stdout_task = spawn_drain(
            child.stdout.take().map(BufReader::new),
            stdout_buf.clone(),
            last_line.clone(),
            StreamKind::Stdout,
            pid,
        );
        let stderr_task = spawn_drain(
            child.stderr.take().map(BufReader::new),
            stderr_buf.clone(),
            last_line.clone(),
            StreamKind::Stderr,
            pid,
        );

        let progress_stop = CancellationToken::new();
        let progress_task = self.spawn_progress_task(
            pid,
            timeout,
            started,
            stdout_buf.clone(),
            stderr_buf.clone(),
            last_line.clone(),
            progress_stop.clone(),
        );

        let mut timed_out = false;
        let mut return_code: i32 = -1;

        let outcome = tokio::select! {
            waited = tokio::time::timeout(timeout, child.wait()) => match waited {
                Ok(Ok(status)) => WaitOutcome::Exited(status.code().unwrap_or(-1)),
                Ok(Err(e)) => {
                    tracing::error!(pid, error = %e, "waiting for process failed");
                    WaitOutcome::WaitFailed
                }
                Err(_) => WaitOutcome::TimedOut,
            },
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        match outcome {
            WaitOutcome::Exited(code) => return_code = code,
            WaitOutcome::WaitFailed => {}
            WaitOutcome::TimedOut => {
                timed_out = true;
                tracing::warn!(
                    pid,
                    timeout_secs = timeout.as_secs_f64(),
                    "command timed out, terminating"
                );
                shutdown_child(&mut child, pid).await;
            }
            WaitOutcome::Cancelled => {
                // The registry is already escalating signals against the pid;
                // reap here, with an outright kill as cross-platform backstop.
                tracing::info!(pid, "command cancelled through the registry");
                match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                    Ok(Ok(status)) => return_code = status.code().unwrap_or(-1),
                    Ok(Err(e)) => {
                        tracing::error!(pid, error = %e, "waiting for cancelled process failed")
                    }
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            tracing::error!(pid, error = %e, "failed to kill cancelled process");
                        }
                    }
                }
            }
        }

        progress_stop.cancel();
        let _ = progress_task.await;

        // The streams close on process exit, so the drains finish on their
        // own; the bound only guards against a wedged task.
        for task in [stdout_task, stderr_task] {
            let _ = tokio::time::timeout(DRAIN_JOIN_TIMEOUT, task).await;
        }

        let stdout = stdout_buf.lock().await.clone();
        let stderr = stderr_buf.lock().await.clone();
        let execution_time = started.elapsed().as_secs_f64();

        let has_output = !stdout.is_empty() || !stderr.is_empty();
        let success = if timed_out { has_output } else { return_code == 0 };
        let partial_results = timed_out && has_output;

        self.registry.mark_exited(pid, return_code).await;
        self.registry.cleanup(pid).await;
        self.telemetry.record(success, execution_time);

        tracing::info!(
            pid,
            return_code,
            success,
            timed_out,
            execution_time,
            output_bytes = stdout.len() + stderr.len(),
            "command finished"
        );

        ExecutionResult {
            stdout,
            stderr,
            return_code,
            success,
            timed_out,
            partial_results,
            execution_time,
            timestamp: Utc::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_progress_task(
        &self,
        pid: u32,
        timeout: Duration,
        started: Instant,
        stdout_buf: Arc<Mutex<String>>,
        stderr_buf: Arc<Mutex<String>>,
        last_line: Arc<Mutex<String>>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let interval = self.progress_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let elapsed = started.elapsed();
                if elapsed > timeout {
                    break;
                }

                // Heuristic only: fraction of the timeout window consumed,
                // capped below 1.0 since the tool has not finished.
                let estimate = (elapsed.as_secs_f64() / timeout.as_secs_f64()).min(0.99);
                let bytes = (stdout_buf.lock().await.len() + stderr_buf.lock().await.len()) as u64;
                let snippet = last_line.lock().await.clone();

                registry.update_progress(pid, estimate, &snippet, bytes).await;
            }
        })
    }
}

fn spawn_drain<R>(
    reader: Option<BufReader<R>>,
    buf: Arc<Mutex<String>>,
    last_line: Arc<Mutex<String>>,
    kind: StreamKind,
    pid: u32,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(reader) = reader else {
            return;
        };
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    {
                        let mut buf = buf.lock().await;
                        buf.push_str(&line);
                        buf.push('\n');
                    }
                    *last_line.lock().await = line.clone();
                    match kind {
                        StreamKind::Stdout => {
                            tracing::info!(target: "arsenal::output", pid, "{}", line)
                        }
                        StreamKind::Stderr => {
                            tracing::warn!(target: "arsenal::output", pid, "{}", line)
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(pid, stream = kind.label(), error = %e, "error draining stream");
                    break;
                }
            }
        }
    })
}

/// Graceful-then-forceful shutdown of a timed-out child.
async fn shutdown_child(child: &mut Child, pid: u32) {
    if let Err(e) = signals::request_stop(pid) {
        tracing::debug!(pid, category = e.category(), error = %e, "graceful stop unavailable");
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::error!(pid, error = %e, "waiting for terminating process failed"),
        Err(_) => {
            tracing::error!(pid, "process unresponsive to graceful stop, force killing");
            if let Err(e) = child.kill().await {
                tracing::error!(pid, error = %e, "force kill failed");
            }
        }
    }
}

fn failure_result(message: &str, started: Instant) -> ExecutionResult {
    ExecutionResult {
        stdout: String::new(),
        stderr: message.to_string(),
        return_code: -1,
        success: false,
        timed_out: false,
        partial_results: false,
        execution_time: started.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
    }
}
