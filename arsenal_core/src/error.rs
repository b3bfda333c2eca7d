//! Error types for the execution engine.
//!
//! Most failure modes in this crate are *outcomes*, not errors: a timed-out
//! command, a control operation against a pid that already finished, or a
//! spawn failure all surface as well-formed result values with the relevant
//! flags set. `EngineError` covers the remainder — the places where the
//! engine itself cannot proceed and a caller (or a log line) needs a typed
//! reason.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to deliver signal to pid {pid}: {message}")]
    Signal { pid: u32, message: String },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("process control is not supported on this platform")]
    Unsupported,
}

impl EngineError {
    /// Short category tag used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Io(_) => "io",
            EngineError::Signal { .. } => "signal",
            EngineError::ConfigParse(_) => "config",
            EngineError::Unsupported => "platform",
        }
    }
}
