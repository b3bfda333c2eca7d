//! Execution counters and host metrics.
//!
//! One `record` call per completed execution; `snapshot` rolls the counters
//! up together with a live sample of host CPU, memory, and disk usage. This
//! is operational state only — nothing persists, and the counters reset with
//! the process.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use sysinfo::{Disks, System};

/// Point-in-time host resource usage. All values are percentages.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HostMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Rolled-up execution statistics merged with host metrics.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub commands_executed: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    /// Sum of wall-clock execution time, in seconds.
    pub total_execution_time: f64,
    pub uptime_seconds: f64,
    pub start_time: DateTime<Utc>,
    /// Fraction of executions that succeeded, in [0, 1].
    pub success_rate: f64,
    pub average_execution_time: f64,
    pub system: HostMetrics,
}

/// Counters and timers for the execution engine.
pub struct TelemetryAggregator {
    commands_executed: AtomicU64,
    successful_commands: AtomicU64,
    failed_commands: AtomicU64,
    /// Stored in microseconds so it fits an atomic.
    total_execution_us: AtomicU64,
    started: Instant,
    start_time: DateTime<Utc>,
    system: Mutex<System>,
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TelemetryAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryAggregator")
            .field(
                "commands_executed",
                &self.commands_executed.load(Ordering::Relaxed),
            )
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self {
            commands_executed: AtomicU64::new(0),
            successful_commands: AtomicU64::new(0),
            failed_commands: AtomicU64::new(0),
            total_execution_us: AtomicU64::new(0),
            started: Instant::now(),
            start_time: Utc::now(),
            system: Mutex::new(System::new()),
        }
    }

    /// Record one completed execution. Called exactly once per command.
    pub fn record(&self, success: bool, execution_time_secs: f64) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_commands.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_commands.fetch_add(1, Ordering::Relaxed);
        }
        self.total_execution_us
            .fetch_add((execution_time_secs * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    /// Counters merged with a fresh host-metrics sample.
    pub async fn snapshot(&self) -> TelemetrySnapshot {
        let commands_executed = self.commands_executed.load(Ordering::Relaxed);
        let successful_commands = self.successful_commands.load(Ordering::Relaxed);
        let failed_commands = self.failed_commands.load(Ordering::Relaxed);
        let total_execution_time =
            self.total_execution_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        let success_rate = if commands_executed > 0 {
            successful_commands as f64 / commands_executed as f64
        } else {
            0.0
        };
        let average_execution_time = if commands_executed > 0 {
            total_execution_time / commands_executed as f64
        } else {
            0.0
        };

        TelemetrySnapshot {
            commands_executed,
            successful_commands,
            failed_commands,
            total_execution_time,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            start_time: self.start_time,
            success_rate,
            average_execution_time,
            system: self.host_metrics().await,
        }
    }

    /// Sample host CPU, memory, and disk usage.
    ///
    /// CPU usage needs two refreshes separated by a short interval to have
    /// anything to differentiate. The sysinfo handle is not held across the
    /// sleep.
    async fn host_metrics(&self) -> HostMetrics {
        self.system.lock().refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

        let (cpu_percent, memory_percent) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();

            let memory_percent = if system.total_memory() > 0 {
                system.used_memory() as f64 / system.total_memory() as f64 * 100.0
            } else {
                0.0
            };
            (system.global_cpu_usage() as f64, memory_percent)
        };

        HostMetrics {
            cpu_percent,
            memory_percent,
            disk_percent: disk_usage_percent(),
        }
    }
}

fn disk_usage_percent() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
    if total > 0 {
        (total - available) as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_and_derived_rates() {
        let telemetry = TelemetryAggregator::new();
        telemetry.record(true, 1.0);
        telemetry.record(true, 2.0);
        telemetry.record(false, 3.0);

        let snapshot = telemetry.snapshot().await;
        assert_eq!(snapshot.commands_executed, 3);
        assert_eq!(snapshot.successful_commands, 2);
        assert_eq!(snapshot.failed_commands, 1);
        assert!((snapshot.total_execution_time - 6.0).abs() < 0.01);
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((snapshot.average_execution_time - 2.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn empty_snapshot_has_zero_rates() {
        let telemetry = TelemetryAggregator::new();
        let snapshot = telemetry.snapshot().await;
        assert_eq!(snapshot.commands_executed, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.average_execution_time, 0.0);
    }
}
