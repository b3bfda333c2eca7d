//! Pid-addressed process signalling.
//!
//! Control operations never own the `Child` handle — that stays with the
//! executor that spawned it. Everything the registry does to a process goes
//! through these pid-addressed helpers instead. On non-unix platforms the
//! stop/continue primitives do not exist, so those helpers report
//! [`EngineError::Unsupported`] and the registry surfaces an explicit
//! `Unsupported` outcome rather than silently failing.

use crate::error::EngineError;

#[cfg(unix)]
fn send(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), EngineError> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), signal).map_err(|e| EngineError::Signal {
        pid,
        message: e.to_string(),
    })
}

/// Request a graceful stop (SIGTERM).
#[cfg(unix)]
pub(crate) fn request_stop(pid: u32) -> Result<(), EngineError> {
    send(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(not(unix))]
pub(crate) fn request_stop(_pid: u32) -> Result<(), EngineError> {
    Err(EngineError::Unsupported)
}

/// Forcefully kill (SIGKILL). Works on stopped processes too.
#[cfg(unix)]
pub(crate) fn force_kill(pid: u32) -> Result<(), EngineError> {
    send(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(not(unix))]
pub(crate) fn force_kill(_pid: u32) -> Result<(), EngineError> {
    Err(EngineError::Unsupported)
}

/// Suspend execution (SIGSTOP).
#[cfg(unix)]
pub(crate) fn suspend(pid: u32) -> Result<(), EngineError> {
    send(pid, nix::sys::signal::Signal::SIGSTOP)
}

#[cfg(not(unix))]
pub(crate) fn suspend(_pid: u32) -> Result<(), EngineError> {
    Err(EngineError::Unsupported)
}

/// Continue a suspended process (SIGCONT).
#[cfg(unix)]
pub(crate) fn resume(pid: u32) -> Result<(), EngineError> {
    send(pid, nix::sys::signal::Signal::SIGCONT)
}

#[cfg(not(unix))]
pub(crate) fn resume(_pid: u32) -> Result<(), EngineError> {
    Err(EngineError::Unsupported)
}

/// Whether the pid still names a live process. Signal 0 performs the
/// existence check without delivering anything.
#[cfg(unix)]
pub(crate) fn is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub(crate) fn is_alive(_pid: u32) -> bool {
    false
}
