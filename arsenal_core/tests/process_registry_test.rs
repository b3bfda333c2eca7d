//! Process registry integration tests.
//!
//! These exercise the registry against real OS processes: control operations
//! are pid-addressed signals, so the interesting behavior (terminate
//! escalation, pause/resume, idempotence) only shows up with a live child.

use arsenal_core::process_registry::{ControlOutcome, ProcessRegistry, ProcessStatus};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Spawn a process that sleeps long enough to outlive any test.
async fn spawn_sleeper() -> (Child, u32) {
    let child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn sleep");
    let pid = child.id().expect("child has a pid before wait");
    (child, pid)
}

#[tokio::test]
async fn register_get_and_list_return_snapshots() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;

    let record = registry.get(pid).await.expect("record exists");
    assert_eq!(record.pid, pid);
    assert_eq!(record.command, "sleep 30");
    assert_eq!(record.status, ProcessStatus::Running);
    assert_eq!(record.progress_estimate, 0.0);
    assert!(record.end_time.is_none());

    let listed = registry.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].pid, pid);

    registry.terminate(pid).await;
    registry.cleanup(pid).await;
    let _ = child.wait().await;
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_is_idempotent_and_status_stays_terminated() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;

    assert!(registry.terminate(pid).await);
    let record = registry.get(pid).await.expect("record still registered");
    assert_eq!(record.status, ProcessStatus::Terminated);
    assert!(record.end_time.is_some());

    // Second call is a successful no-op.
    assert!(registry.terminate(pid).await);
    let record = registry.get(pid).await.expect("record still registered");
    assert_eq!(record.status, ProcessStatus::Terminated);

    // The process really died.
    let status = child.wait().await.expect("wait succeeds");
    assert!(!status.success());

    registry.cleanup(pid).await;
}

#[cfg(unix)]
#[tokio::test]
async fn pause_and_resume_round_trip_preserves_the_record() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;
    let before = registry.get(pid).await.expect("record exists");

    assert_eq!(registry.pause(pid).await, ControlOutcome::Applied);
    let paused = registry.get(pid).await.expect("record exists");
    assert_eq!(paused.status, ProcessStatus::Paused);

    assert_eq!(registry.resume(pid).await, ControlOutcome::Applied);
    let resumed = registry.get(pid).await.expect("record exists");
    assert_eq!(resumed.status, ProcessStatus::Running);

    // Identity fields survive the round trip untouched.
    assert_eq!(resumed.command, before.command);
    assert_eq!(resumed.start_time, before.start_time);

    registry.terminate(pid).await;
    registry.cleanup(pid).await;
    let _ = child.wait().await;
}

#[cfg(unix)]
#[tokio::test]
async fn pause_and_resume_reject_invalid_states() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;

    // Resume before any pause: the process is Running.
    assert_eq!(registry.resume(pid).await, ControlOutcome::InvalidState);

    assert_eq!(registry.pause(pid).await, ControlOutcome::Applied);
    assert_eq!(registry.pause(pid).await, ControlOutcome::InvalidState);

    registry.terminate(pid).await;
    registry.cleanup(pid).await;
    let _ = child.wait().await;
}

#[tokio::test]
async fn control_operations_against_unknown_pids_do_not_error() {
    let registry = ProcessRegistry::new();

    assert!(!registry.terminate(999_999_999).await);
    assert_eq!(registry.pause(999_999_999).await, ControlOutcome::NotFound);
    assert_eq!(registry.resume(999_999_999).await, ControlOutcome::NotFound);
    assert!(registry.get(999_999_999).await.is_none());
    assert!(registry.cleanup(999_999_999).await.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_returns_false_for_naturally_finished_processes() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;
    registry.mark_exited(pid, 0).await;

    assert!(!registry.terminate(pid).await);
    let record = registry.get(pid).await.expect("record exists");
    assert_eq!(record.status, ProcessStatus::Finished);

    let _ = child.kill().await;
    registry.cleanup(pid).await;
}

#[tokio::test]
async fn duplicate_registration_keeps_the_original_record() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;
    registry.register(pid, "some other command").await;

    let record = registry.get(pid).await.expect("record exists");
    assert_eq!(record.command, "sleep 30");
    assert_eq!(registry.list().await.len(), 1);

    registry.terminate(pid).await;
    registry.cleanup(pid).await;
    let _ = child.wait().await;
}

#[tokio::test]
async fn terminate_happens_within_the_grace_window() {
    let registry = ProcessRegistry::new();
    let (mut child, pid) = spawn_sleeper().await;

    registry.register(pid, "sleep 30").await;

    let start = std::time::Instant::now();
    assert!(registry.terminate(pid).await);
    // Graceful stop plus one grace period, with slack for a loaded machine.
    assert!(start.elapsed() < Duration::from_secs(5));

    registry.cleanup(pid).await;
    let _ = child.wait().await;
}
