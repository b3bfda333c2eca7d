//! # Logging Initialization
//!
//! Centralized setup for the `tracing` stack. `init_logging` is guarded by a
//! `std::sync::Once`, so it is safe to call from multiple entry points; only
//! the first call configures the subscriber.
//!
//! By default logs go to a daily-rolling file in the user cache directory
//! (via the `directories` crate) with ANSI disabled. When file logging is
//! off — or the cache directory is unusable — everything goes to stderr with
//! colors enabled. Verbosity follows `RUST_LOG` when set, otherwise the
//! level passed by the caller.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Initialize verbose logging for tests.
///
/// This configures a `trace`-level subscriber that logs to stderr.
pub fn init_test_logging() {
    init_logging("trace", false).expect("Failed to initialize test logging");
}

/// Initializes the logging system.
///
/// For terminal debugging: `init_logging("debug", false)` (stderr, colors).
/// For production: `init_logging("info", true)` (rolling file, no colors).
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},arsenal_core=debug")));

        if log_to_file && let Some(proj_dirs) = ProjectDirs::from("dev", "Arsenal", "arsenal") {
            let log_dir = proj_dirs.cache_dir();

            // tracing-appender panics on permission errors, so probe the
            // directory before handing it over.
            if can_write(log_dir) {
                let file_appender = tracing_appender::rolling::daily(log_dir, "arsenal.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // The guard is intentionally leaked so logs flush on exit.
                Box::leak(Box::new(guard));
                return;
            }
        }

        // Fallback or explicit stderr logging.
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

/// Whether the log directory exists (or can be created) and is writable.
fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".arsenal_log_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
