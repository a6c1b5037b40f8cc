// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process worker adapter.
//!
//! Spawns the `runq-worker` binary and speaks JSON lines over its
//! stdin/stdout. A background reader task decodes events and pushes them
//! to the manager loop; EOF on stdout becomes a synthetic `Exited`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{WorkerAdapter, WorkerCommand, WorkerError, WorkerEvent, WorkerLauncher};
use crate::env;

/// Launches `runq-worker` child processes.
pub struct ProcessLauncher {
    worker_bin: PathBuf,
}

impl ProcessLauncher {
    pub fn new(worker_bin: PathBuf) -> Self {
        Self { worker_bin }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn spawn(
        &self,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Result<Box<dyn WorkerAdapter>, WorkerError> {
        let mut child = Command::new(&self.worker_bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                WorkerError::Spawn(format!("{}: {}", self.worker_bin.display(), err))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdout unavailable".into()))?;

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<WorkerEvent>(&line) {
                        Ok(event) => {
                            debug!(?event, "worker event");
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(%err, line = %line, "unparseable worker event"),
                    },
                    Ok(None) => {
                        let _ = events.send(WorkerEvent::Exited).await;
                        break;
                    }
                    Err(err) => {
                        warn!(%err, "worker stdout read failed");
                        let _ = events.send(WorkerEvent::Exited).await;
                        break;
                    }
                }
            }
        });

        Ok(Box::new(ProcessWorker { child, stdin, reader }))
    }
}

struct ProcessWorker {
    child: Child,
    stdin: ChildStdin,
    reader: JoinHandle<()>,
}

#[async_trait]
impl WorkerAdapter for ProcessWorker {
    async fn send(&mut self, command: WorkerCommand) -> Result<(), WorkerError> {
        let mut line = serde_json::to_vec(&command)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), WorkerError> {
        // Best effort: the worker may already be gone
        let _ = self.send(WorkerCommand::Shutdown).await;
        match tokio::time::timeout(env::drain_timeout(), self.child.wait()).await {
            Ok(status) => {
                debug!(?status, "worker exited");
            }
            Err(_) => {
                warn!("worker did not exit within drain timeout, killing");
                self.child.start_kill()?;
                let _ = self.child.wait().await;
            }
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), WorkerError> {
        self.child.start_kill()?;
        let _ = self.child.wait().await;
        Ok(())
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
