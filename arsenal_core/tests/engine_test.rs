//! Execution engine facade integration tests.
//!
//! End-to-end behavior of `execute`: cache consultation, the
//! only-cache-clean-successes policy, and telemetry recording, each against
//! real subprocesses.

use arsenal_core::{EngineConfig, ExecOptions, ExecutionEngine};
use std::time::Duration;

fn engine() -> ExecutionEngine {
    ExecutionEngine::new(EngineConfig::default())
}

#[tokio::test]
async fn repeated_execution_is_served_from_the_cache() {
    let engine = engine();

    let first = engine.execute("echo hello", ExecOptions::default()).await;
    let second = engine.execute("echo hello", ExecOptions::default()).await;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(first.stdout, second.stdout);
    // The cached result is the first result, not a rerun.
    assert_eq!(first.timestamp, second.timestamp);

    let stats = engine.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);

    // Exactly one subprocess was spawned.
    let snapshot = engine.telemetry().snapshot().await;
    assert_eq!(snapshot.commands_executed, 1);
}

#[tokio::test]
async fn cache_bypass_spawns_every_time() {
    let engine = engine();
    let opts = ExecOptions {
        timeout: None,
        use_cache: false,
    };

    engine.execute("echo hi", opts.clone()).await;
    engine.execute("echo hi", opts).await;

    let snapshot = engine.telemetry().snapshot().await;
    assert_eq!(snapshot.commands_executed, 2);

    let stats = engine.cache().stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn failed_results_are_not_cached() {
    let engine = engine();

    engine.execute("exit 7", ExecOptions::default()).await;
    let second = engine.execute("exit 7", ExecOptions::default()).await;

    assert!(!second.success);
    assert_eq!(second.return_code, 7);

    let snapshot = engine.telemetry().snapshot().await;
    assert_eq!(snapshot.commands_executed, 2);
    assert_eq!(engine.cache().stats().size, 0);
}

#[tokio::test]
async fn timed_out_results_are_not_cached_even_with_partial_output() {
    let engine = engine();
    let opts = ExecOptions {
        timeout: Some(Duration::from_millis(400)),
        use_cache: true,
    };

    let first = engine.execute("echo partial; sleep 5", opts.clone()).await;
    assert!(first.timed_out);
    assert!(first.success, "partial output counts as a success");

    let second = engine.execute("echo partial; sleep 5", opts).await;
    assert!(second.timed_out, "second call ran the command again");

    let snapshot = engine.telemetry().snapshot().await;
    assert_eq!(snapshot.commands_executed, 2);
    assert_eq!(engine.cache().stats().size, 0);
}

#[tokio::test]
async fn per_call_timeout_overrides_the_configured_default() {
    let engine = engine();
    let opts = ExecOptions {
        timeout: Some(Duration::from_millis(300)),
        use_cache: false,
    };

    let start = std::time::Instant::now();
    let result = engine.execute("sleep 10", opts).await;

    assert!(result.timed_out);
    assert!(start.elapsed() < Duration::from_secs(8));
}

#[tokio::test]
async fn telemetry_snapshot_reflects_mixed_outcomes() {
    let engine = engine();
    let opts = ExecOptions {
        timeout: None,
        use_cache: false,
    };

    engine.execute("echo ok", opts.clone()).await;
    engine.execute("exit 1", opts).await;

    let snapshot = engine.telemetry().snapshot().await;
    assert_eq!(snapshot.commands_executed, 2);
    assert_eq!(snapshot.successful_commands, 1);
    assert_eq!(snapshot.failed_commands, 1);
    assert!((snapshot.success_rate - 0.5).abs() < f64::EPSILON);
    assert!(snapshot.uptime_seconds > 0.0);

    // Host metrics are percentages, whatever the machine is doing.
    assert!((0.0..=100.0).contains(&snapshot.system.memory_percent));
    assert!((0.0..=100.0).contains(&snapshot.system.disk_percent));
    assert!(snapshot.system.cpu_percent >= 0.0);
}

#[tokio::test]
async fn engines_are_isolated_from_each_other() {
    let first = engine();
    let second = engine();

    first.execute("echo isolated", ExecOptions::default()).await;

    assert_eq!(first.cache().stats().misses, 1);
    assert_eq!(second.cache().stats().misses, 0);
    let snapshot = second.telemetry().snapshot().await;
    assert_eq!(snapshot.commands_executed, 0);
}
