//! Process registry and lifecycle control
//!
//! This module is the single source of truth for every in-flight external
//! process. The executor registers a process right after spawning it, feeds
//! progress estimates while it runs, and removes the record once output is
//! fully drained. Control endpoints reach running processes exclusively
//! through this registry — terminate, pause, and resume are pid-addressed and
//! never take ownership of the OS handle, which stays with the spawning
//! executor.

use crate::constants::{OUTPUT_SNIPPET_MAX, TERMINATE_GRACE, TERMINATE_POLL_INTERVAL};
use crate::signals;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Current state of a registered process.
pub enum ProcessStatus {
    Running,
    Paused,
    Terminated,
    Finished,
    Error,
}

impl ProcessStatus {
    /// Check if this state represents a process that is done for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Terminated | ProcessStatus::Finished | ProcessStatus::Error
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Serializable snapshot of one in-flight process.
///
/// `progress_estimate` is derived from elapsed time against the command
/// timeout. It says nothing about how far the tool actually got; the name is
/// deliberate so callers do not treat it as ground truth.
pub struct ProcessRecord {
    pub pid: u32,
    pub command: String,
    pub status: ProcessStatus,
    pub start_time: DateTime<Utc>,
    /// Set once the process reaches a terminal status.
    pub end_time: Option<DateTime<Utc>>,
    pub progress_estimate: f64,
    pub last_output_snippet: String,
    pub bytes_processed: u64,
    pub runtime_secs: f64,
    /// `None` until the estimate has something to extrapolate from.
    pub eta_secs: Option<f64>,
}

impl ProcessRecord {
    fn new(pid: u32, command: String) -> Self {
        Self {
            pid,
            command,
            status: ProcessStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            progress_estimate: 0.0,
            last_output_snippet: String::new(),
            bytes_processed: 0,
            runtime_secs: 0.0,
            eta_secs: None,
        }
    }
}

/// Registry-internal entry. The cancellation token and the monotonic start
/// instant never leave this struct; snapshots expose the record only.
#[derive(Debug)]
struct ProcessEntry {
    record: ProcessRecord,
    started: Instant,
    cancel: CancellationToken,
}

/// Outcome of a pause/resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOutcome {
    Applied,
    NotFound,
    InvalidState,
    /// The platform has no suspend/continue primitive.
    Unsupported,
}

impl ControlOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, ControlOutcome::Applied)
    }
}

/// Thread-safe table of in-flight processes keyed by pid.
///
/// All mutations serialize under one registry-wide lock; the workload is tens
/// of concurrent commands, not thousands, so coarse granularity is fine.
#[derive(Debug, Default, Clone)]
pub struct ProcessRegistry {
    entries: Arc<RwLock<HashMap<u32, ProcessEntry>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a Running record for a freshly spawned process and hand back
    /// the cancellation token the executor must watch.
    ///
    /// Registering a pid that is already live is a logic error (pids are
    /// unique among live processes); the existing record is left untouched
    /// and its token returned so the caller still observes cancellation.
    pub async fn register(&self, pid: u32, command: &str) -> CancellationToken {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&pid) {
            tracing::error!(pid, "attempted to register an already-registered pid");
            return existing.cancel.clone();
        }

        tracing::info!(pid, command, "registered process");
        let entry = ProcessEntry {
            record: ProcessRecord::new(pid, command.to_string()),
            started: Instant::now(),
            cancel: CancellationToken::new(),
        };
        let token = entry.cancel.clone();
        entries.insert(pid, entry);
        token
    }

    /// Record a fresh progress estimate for a live pid.
    ///
    /// An unknown pid is a silent no-op: the progress task races process
    /// completion and may report after cleanup already ran. Progress never
    /// moves backwards for a live pid, and the ETA extrapolates
    /// `runtime / progress * (1 - progress)` once there is progress to
    /// extrapolate from.
    pub async fn update_progress(
        &self,
        pid: u32,
        progress: f64,
        last_output: &str,
        bytes_processed: u64,
    ) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&pid) else {
            return;
        };
        if entry.record.status.is_terminal() {
            return;
        }

        let progress = progress.clamp(0.0, 1.0).max(entry.record.progress_estimate);
        let runtime = entry.started.elapsed().as_secs_f64();

        entry.record.progress_estimate = progress;
        entry.record.bytes_processed = bytes_processed;
        entry.record.runtime_secs = runtime;
        entry.record.eta_secs = if progress > 0.0 {
            Some(runtime / progress * (1.0 - progress))
        } else {
            None
        };
        entry.record.last_output_snippet = truncate_snippet(last_output);
    }

    /// Terminate a process: cancel its token, request a graceful stop, wait
    /// out the grace period, then kill forcefully if it is still alive.
    ///
    /// Idempotent — calling this on an already-Terminated pid is a
    /// successful no-op. Returns `false` only when the pid is unknown or
    /// already finished on its own.
    pub async fn terminate(&self, pid: u32) -> bool {
        let (status, cancel) = {
            let entries = self.entries.read().await;
            match entries.get(&pid) {
                Some(entry) => (entry.record.status, entry.cancel.clone()),
                None => {
                    tracing::warn!(pid, "terminate requested for unknown pid");
                    return false;
                }
            }
        };

        match status {
            ProcessStatus::Terminated => {
                tracing::debug!(pid, "terminate repeated for already-terminated pid");
                return true;
            }
            ProcessStatus::Finished | ProcessStatus::Error => {
                tracing::warn!(pid, ?status, "terminate requested for completed pid");
                return false;
            }
            ProcessStatus::Running | ProcessStatus::Paused => {}
        }

        tracing::warn!(pid, "terminating process");
        cancel.cancel();

        // A stopped process cannot act on SIGTERM until it is continued.
        if status == ProcessStatus::Paused
            && let Err(e) = signals::resume(pid)
        {
            tracing::warn!(pid, category = e.category(), error = %e, "could not continue paused process before terminate");
        }

        if let Err(e) = signals::request_stop(pid) {
            tracing::warn!(pid, category = e.category(), error = %e, "graceful stop request failed");
        }

        let deadline = Instant::now() + TERMINATE_GRACE;
        while signals::is_alive(pid) && Instant::now() < deadline {
            tokio::time::sleep(TERMINATE_POLL_INTERVAL).await;
        }

        if signals::is_alive(pid) {
            tracing::warn!(pid, "still alive after grace period, killing forcefully");
            if let Err(e) = signals::force_kill(pid) {
                tracing::error!(pid, category = e.category(), error = %e, "forceful kill failed");
            }
        }

        // The owning executor may have observed the exit and marked the
        // record in the meantime; terminal states never regress.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&pid)
            && !entry.record.status.is_terminal()
        {
            entry.record.status = ProcessStatus::Terminated;
            entry.record.end_time = Some(Utc::now());
        }
        true
    }

    /// Suspend a Running process. Valid only from Running.
    pub async fn pause(&self, pid: u32) -> ControlOutcome {
        if !cfg!(unix) {
            return ControlOutcome::Unsupported;
        }

        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&pid) else {
            return ControlOutcome::NotFound;
        };
        if entry.record.status != ProcessStatus::Running {
            tracing::warn!(pid, status = ?entry.record.status, "pause rejected");
            return ControlOutcome::InvalidState;
        }

        match signals::suspend(pid) {
            Ok(()) => {
                tracing::info!(pid, "paused process");
                entry.record.status = ProcessStatus::Paused;
                ControlOutcome::Applied
            }
            Err(e) => {
                // The process died between the status check and the signal.
                tracing::warn!(pid, category = e.category(), error = %e, "pause signal failed");
                ControlOutcome::NotFound
            }
        }
    }

    /// Continue a Paused process. Valid only from Paused.
    pub async fn resume(&self, pid: u32) -> ControlOutcome {
        if !cfg!(unix) {
            return ControlOutcome::Unsupported;
        }

        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&pid) else {
            return ControlOutcome::NotFound;
        };
        if entry.record.status != ProcessStatus::Paused {
            tracing::warn!(pid, status = ?entry.record.status, "resume rejected");
            return ControlOutcome::InvalidState;
        }

        match signals::resume(pid) {
            Ok(()) => {
                tracing::info!(pid, "resumed process");
                entry.record.status = ProcessStatus::Running;
                ControlOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(pid, category = e.category(), error = %e, "resume signal failed");
                ControlOutcome::NotFound
            }
        }
    }

    /// Record the natural exit of a process. Executor-only; ignored if the
    /// record already reached a terminal state (e.g. Terminated).
    pub async fn mark_exited(&self, pid: u32, return_code: i32) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&pid)
            && !entry.record.status.is_terminal()
        {
            entry.record.status = if return_code == 0 {
                ProcessStatus::Finished
            } else {
                ProcessStatus::Error
            };
            entry.record.end_time = Some(Utc::now());
            entry.record.runtime_secs = entry.started.elapsed().as_secs_f64();
        }
    }

    /// Atomically remove and return the record for a pid.
    ///
    /// Called exactly once by the owning executor, after output is fully
    /// drained and telemetry recorded.
    pub async fn cleanup(&self, pid: u32) -> Option<ProcessRecord> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(&pid);
        if entry.is_some() {
            tracing::debug!(pid, remaining = entries.len(), "removed process from registry");
        }
        entry.map(|e| e.record)
    }

    /// Snapshot of a single process. Never exposes the live OS handle.
    pub async fn get(&self, pid: u32) -> Option<ProcessRecord> {
        let entries = self.entries.read().await;
        entries.get(&pid).map(|e| e.record.clone())
    }

    /// Snapshot of every registered process.
    pub async fn list(&self) -> Vec<ProcessRecord> {
        let entries = self.entries.read().await;
        entries.values().map(|e| e.record.clone()).collect()
    }
}

fn truncate_snippet(output: &str) -> String {
    let trimmed = output.trim_end();
    if trimmed.len() <= OUTPUT_SNIPPET_MAX {
        return trimmed.to_string();
    }
    let mut cut = OUTPUT_SNIPPET_MAX;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    trimmed[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_correctly_identified() {
        assert!(ProcessStatus::Terminated.is_terminal());
        assert!(ProcessStatus::Finished.is_terminal());
        assert!(ProcessStatus::Error.is_terminal());
        assert!(!ProcessStatus::Running.is_terminal());
        assert!(!ProcessStatus::Paused.is_terminal());
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_eta_extrapolates() {
        let registry = ProcessRegistry::new();
        // A pid no real process holds in practice for the registry's own
        // bookkeeping; no signals are sent by update_progress.
        registry.register(u32::MAX, "scan").await;

        registry.update_progress(u32::MAX, 0.5, "half way", 10).await;
        let record = registry.get(u32::MAX).await.unwrap();
        assert_eq!(record.progress_estimate, 0.5);
        assert!(record.eta_secs.is_some());

        // A late, lower estimate must not regress the published value.
        registry.update_progress(u32::MAX, 0.2, "late report", 12).await;
        let record = registry.get(u32::MAX).await.unwrap();
        assert_eq!(record.progress_estimate, 0.5);
        assert_eq!(record.bytes_processed, 12);
    }

    #[tokio::test]
    async fn update_progress_on_unknown_pid_is_a_silent_noop() {
        let registry = ProcessRegistry::new();
        registry.update_progress(4242, 0.9, "ghost", 1).await;
        assert!(registry.get(4242).await.is_none());
    }

    #[tokio::test]
    async fn zero_progress_has_unknown_eta() {
        let registry = ProcessRegistry::new();
        registry.register(u32::MAX, "scan").await;
        registry.update_progress(u32::MAX, 0.0, "", 0).await;
        let record = registry.get(u32::MAX).await.unwrap();
        assert!(record.eta_secs.is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_and_returns_the_record() {
        let registry = ProcessRegistry::new();
        registry.register(7, "echo hi").await;
        let record = registry.cleanup(7).await.unwrap();
        assert_eq!(record.command, "echo hi");
        assert!(registry.cleanup(7).await.is_none());
        assert!(registry.list().await.is_empty());
    }

    #[test]
    fn snippets_are_bounded() {
        let long = "x".repeat(OUTPUT_SNIPPET_MAX * 2);
        assert_eq!(truncate_snippet(&long).len(), OUTPUT_SNIPPET_MAX);
        assert_eq!(truncate_snippet("short\n"), "short");
    }
}
