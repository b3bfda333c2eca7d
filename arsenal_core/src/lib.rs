//! # Arsenal Core
//!
//! This crate is the command-execution engine behind the `arsenal` tool
//! server: it lets callers trigger long-running external command-line tools
//! and get back status, output, and control without blocking the service.
//! The HTTP handlers and agent-protocol bridge that sit in front of it are
//! thin glue; everything with real concurrency and lifecycle complexity
//! lives here.
//!
//! ## Modules
//!
//! - **`engine`**: The [`engine::ExecutionEngine`] facade — the single entry
//!   point collaborators call. Wraps cache lookup, execution, and telemetry
//!   recording, and hands out registry/cache/telemetry handles for the
//!   control and observability surfaces.
//!
//! - **`executor`**: Spawns one monitored OS process per invocation, drives
//!   the output-drain and progress-estimation tasks, enforces the timeout,
//!   and always produces a well-formed [`executor::ExecutionResult`].
//!
//! - **`process_registry`**: Thread-safe table of in-flight processes keyed
//!   by pid. Single source of truth for status, progress, and ETA, and the
//!   only path by which terminate/pause/resume reach a running process.
//!
//! - **`result_cache`**: TTL + capacity-bound LRU cache of prior command
//!   results, keyed on command plus canonicalized parameters.
//!
//! - **`telemetry`**: Execution counters plus live host CPU/memory/disk
//!   metrics, rolled up into serializable snapshots.
//!
//! - **`config`**: TOML-loadable [`config::EngineConfig`] with the engine's
//!   tunables; defaults live in `constants`.
//!
//! - **`logging`**: `tracing` subscriber setup (rolling file with stderr
//!   fallback).

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod process_registry;
pub mod result_cache;
pub mod telemetry;

mod signals;

// Re-export the main types for easier use.
pub use config::EngineConfig;
pub use engine::{ExecOptions, ExecutionEngine};
pub use error::EngineError;
pub use executor::{CommandExecutor, ExecutionResult};
pub use process_registry::{ControlOutcome, ProcessRecord, ProcessRegistry, ProcessStatus};
pub use result_cache::{CacheStats, ResultCache};
pub use telemetry::{TelemetryAggregator, TelemetrySnapshot};
