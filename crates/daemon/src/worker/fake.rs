// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fake worker for manager tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use runq_core::{mint, ExitStatus, RunEntry};

use super::{WorkerAdapter, WorkerCommand, WorkerError, WorkerEvent, WorkerLauncher};

/// Launcher whose workers record commands and whose event stream the test
/// can drive directly. With `auto_complete`, every executed plan
/// immediately opens one run, closes it, and completes.
#[derive(Clone, Default)]
pub(crate) struct FakeLauncher {
    pub auto_complete: bool,
    pub commands: Arc<Mutex<Vec<WorkerCommand>>>,
    events: Arc<Mutex<Option<mpsc::Sender<WorkerEvent>>>>,
}

impl FakeLauncher {
    pub fn new(auto_complete: bool) -> Self {
        Self { auto_complete, ..Self::default() }
    }

    /// Emit an event as if the worker produced it.
    pub async fn emit(&self, event: WorkerEvent) {
        let sender = self.events.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    pub fn commands(&self) -> Vec<WorkerCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn spawn(
        &self,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Result<Box<dyn WorkerAdapter>, WorkerError> {
        *self.events.lock() = Some(events.clone());
        let _ = events.send(WorkerEvent::Ready).await;
        Ok(Box::new(FakeWorker {
            auto_complete: self.auto_complete,
            commands: Arc::clone(&self.commands),
            events,
        }))
    }
}

pub(crate) struct FakeWorker {
    auto_complete: bool,
    commands: Arc<Mutex<Vec<WorkerCommand>>>,
    events: mpsc::Sender<WorkerEvent>,
}

#[async_trait]
impl WorkerAdapter for FakeWorker {
    async fn send(&mut self, command: WorkerCommand) -> Result<(), WorkerError> {
        self.commands.lock().push(command.clone());
        match command {
            WorkerCommand::Execute { item } if self.auto_complete => {
                let uid = item.uid().unwrap_or_default().to_string();
                let run_uid = mint("run");
                let _ = self.events.send(WorkerEvent::PlanStarted { item_uid: uid }).await;
                let _ = self
                    .events
                    .send(WorkerEvent::RunListChanged {
                        runs: vec![RunEntry {
                            uid: run_uid.clone(),
                            is_open: false,
                            exit_status: Some("success".into()),
                        }],
                    })
                    .await;
                let _ = self
                    .events
                    .send(WorkerEvent::PlanCompleted {
                        exit_status: ExitStatus::Completed,
                        run_uids: vec![run_uid],
                    })
                    .await;
            }
            WorkerCommand::Shutdown => {
                let _ = self.events.send(WorkerEvent::Exited).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), WorkerError> {
        let _ = self.events.send(WorkerEvent::Exited).await;
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), WorkerError> {
        let _ = self.events.send(WorkerEvent::Exited).await;
        Ok(())
    }
}
