//! Execution facade.
//!
//! `ExecutionEngine` is the single entry point external collaborators use.
//! It wires the cache lookup, the monitored executor, and telemetry into one
//! `execute` call, and hands out read handles to the registry, cache, and
//! telemetry for the control and observability surfaces.
//!
//! The registry, cache, and telemetry instances are owned here and injected
//! into the executor — there is no global state, so tests and embedders can
//! build as many isolated engines as they want.

use crate::config::EngineConfig;
use crate::executor::{CommandExecutor, ExecutionResult};
use crate::process_registry::ProcessRegistry;
use crate::result_cache::ResultCache;
use crate::telemetry::TelemetryAggregator;
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;

/// Per-call execution options.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Overrides the configured default timeout when set.
    pub timeout: Option<Duration>,
    pub use_cache: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            use_cache: true,
        }
    }
}

/// The command-execution engine: cache, executor, registry, and telemetry
/// behind one `execute` entry point.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    registry: Arc<ProcessRegistry>,
    cache: Arc<ResultCache>,
    telemetry: Arc<TelemetryAggregator>,
    executor: CommandExecutor,
    default_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let cache = Arc::new(ResultCache::new(config.cache_max_entries, config.cache_ttl()));
        let telemetry = Arc::new(TelemetryAggregator::new());
        let executor = CommandExecutor::new(
            registry.clone(),
            telemetry.clone(),
            config.progress_interval(),
        );

        Self {
            registry,
            cache,
            telemetry,
            executor,
            default_timeout: config.command_timeout(),
        }
    }

    /// Execute a command, consulting the result cache first.
    ///
    /// Only successful results are cached, and never timed-out ones — a
    /// partial scan is worth returning once, not replaying for an hour.
    pub async fn execute(&self, command: &str, opts: ExecOptions) -> ExecutionResult {
        let params = Map::new();

        if opts.use_cache
            && let Some(cached) = self.cache.get(command, &params)
        {
            tracing::info!(command, "returning cached result");
            return cached;
        }

        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let result = self.executor.execute(command, timeout).await;

        if opts.use_cache && result.success && !result.timed_out {
            self.cache.set(command, &params, result.clone());
        }

        result
    }

    /// Handle for the process-control surface (list/get/terminate/pause/resume).
    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    /// Handle for cache observability and invalidation.
    pub fn cache(&self) -> Arc<ResultCache> {
        self.cache.clone()
    }

    /// Handle for the telemetry surface.
    pub fn telemetry(&self) -> Arc<TelemetryAggregator> {
        self.telemetry.clone()
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
