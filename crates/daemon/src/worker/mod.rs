// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervision.
//!
//! The worker is a separate OS process: a misbehaving plan must not take
//! the manager down with it. The [`WorkerAdapter`] trait is the seam
//! between the manager and a live worker; [`WorkerLauncher`] creates one.
//! Lifecycle events flow back to the manager loop over a channel handed
//! to the launcher, so event-vs-request ordering is resolved by arrival
//! at the loop.

pub(crate) mod process;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use runq_core::{ExitStatus, Item, PauseOption, RunEntry};

pub use process::ProcessLauncher;

/// Errors from worker supervision.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker message error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Command sent to the worker process, one JSON line each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum WorkerCommand {
    Execute { item: Item },
    Pause { option: PauseOption },
    Resume,
    Stop,
    Abort,
    Halt,
    QueryRuns,
    Shutdown,
}

/// Lifecycle event emitted by the worker process.
///
/// `Exited` is synthesized by the supervisor when the child's stdout
/// closes; the worker never sends it itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    Ready,
    PlanStarted { item_uid: String },
    PlanPaused,
    PlanCompleted { exit_status: ExitStatus, run_uids: Vec<String> },
    RunListChanged { runs: Vec<RunEntry> },
    Exited,
}

/// Handle to a live worker.
#[async_trait]
pub trait WorkerAdapter: Send + Sync {
    /// Forward a command. Completion is acknowledgement of receipt only;
    /// the outcome arrives later as a [`WorkerEvent`].
    async fn send(&mut self, command: WorkerCommand) -> Result<(), WorkerError>;

    /// Orderly shutdown: ask the worker to exit and wait for it, killing
    /// it after the drain timeout.
    async fn shutdown(&mut self) -> Result<(), WorkerError>;

    /// Fault injection: terminate the worker without cleanup.
    async fn kill(&mut self) -> Result<(), WorkerError>;
}

/// Creates workers. The manager keeps one launcher for its lifetime and
/// spawns a worker per environment-open request.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn spawn(
        &self,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Result<Box<dyn WorkerAdapter>, WorkerError>;
}
