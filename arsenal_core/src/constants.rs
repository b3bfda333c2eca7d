//! # Engine-wide Defaults
//!
//! Central place for the tunables the execution engine falls back to when a
//! caller or a config file does not say otherwise. Anything a deployment is
//! expected to tune also appears as a field on [`crate::config::EngineConfig`];
//! the values here are the documented defaults for those fields.

use std::time::Duration;

/// Default timeout applied to a command when the caller does not pass one.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Default capacity of the result cache, in entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

/// Default time-to-live for a cached result.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// How often the progress-estimation task recomputes its heuristic.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 800;

/// Grace period between a graceful stop request and forceful kill when a
/// process is terminated through the registry.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Poll interval while waiting out [`TERMINATE_GRACE`].
pub const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the executor waits for a timed-out process to honor a graceful
/// stop before killing it outright.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the output-drain tasks after process exit.
/// The streams close when the process dies, so this only fires if a drain
/// task is wedged.
pub const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum length of the `last_output_snippet` kept on a process record.
pub const OUTPUT_SNIPPET_MAX: usize = 160;

/// Per-entry fallback used by the cache footprint estimate when a payload
/// cannot be serialized for measurement.
pub const CACHE_FOOTPRINT_FALLBACK_BYTES: u64 = 1024;
