// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: RUNQ_STATE_DIR > XDG_STATE_HOME/runq > ~/.local/state/runq
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("RUNQ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("runq"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/runq"))
}

/// Control-channel I/O deadline
pub fn ipc_timeout() -> Duration {
    std::env::var("RUNQ_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// TCP port for remote control connections. When set, the daemon listens
/// on this port in addition to the Unix socket.
pub fn tcp_port() -> Option<u16> {
    std::env::var("RUNQ_TCP_PORT").ok().and_then(|s| s.parse::<u16>().ok())
}

/// Pre-shared control-channel key. When set, TCP requests must carry a
/// matching `key` in their params; without it the channel is unencrypted.
pub fn control_key() -> Option<String> {
    std::env::var("QSERVER_ZMQ_PRIVATE_KEY").ok().filter(|s| !s.is_empty())
}

/// Worker shutdown drain timeout (default 5s).
pub fn drain_timeout() -> Duration {
    std::env::var("RUNQ_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Path of the worker binary. Defaults to `runq-worker` next to the
/// current executable.
pub fn worker_bin() -> PathBuf {
    if let Ok(path) = std::env::var("RUNQ_WORKER_BIN") {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("runq-worker")))
        .unwrap_or_else(|| PathBuf::from("runq-worker"))
}

/// Allowed-items file. When unset every plan is allowed.
pub fn permissions_path() -> Option<PathBuf> {
    std::env::var("RUNQ_ALLOWED_ITEMS").ok().map(PathBuf::from)
}
