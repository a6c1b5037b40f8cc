// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-process side of the supervisor protocol.
//!
//! Hosted by the `runq-worker` binary. Reads [`WorkerCommand`] JSON lines
//! from stdin, writes [`WorkerEvent`] JSON lines to stdout, and executes
//! plans with a stand-in run engine: each plan opens `num_runs` runs of
//! `num` checkpoints, sleeping `delay` seconds per checkpoint and honoring
//! pause/resume/stop/abort/halt between checkpoints. The scientific run
//! engine proper lives outside this repository; this process exists so
//! the supervisor manages a real child over a real pipe.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use runq_core::{mint, ExitStatus, Item, PauseOption, RunEntry};

use crate::worker::{WorkerCommand, WorkerEvent};

#[derive(Debug, Error)]
pub enum WorkerProcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    Run,
    Pause(PauseOption),
    Finish(ExitStatus),
}

/// Main loop of the worker process.
pub async fn run() -> Result<(), WorkerProcError> {
    let (events_tx, mut events_rx) = mpsc::channel::<WorkerEvent>(64);

    // Single writer task keeps stdout frames whole
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events_rx.recv().await {
            let Ok(mut line) = serde_json::to_vec(&event) else {
                continue;
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let _ = events_tx.send(WorkerEvent::Ready).await;

    let runs: Arc<Mutex<Vec<RunEntry>>> = Arc::new(Mutex::new(Vec::new()));
    let mut active: Option<(watch::Sender<Control>, JoinHandle<()>)> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command: WorkerCommand = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("runq-worker: unparseable command: {}", err);
                continue;
            }
        };
        match command {
            WorkerCommand::Execute { item } => {
                if active.as_ref().is_some_and(|(_, task)| !task.is_finished()) {
                    eprintln!("runq-worker: execute while a plan is active, ignored");
                    continue;
                }
                let (control_tx, control_rx) = watch::channel(Control::Run);
                let task = tokio::spawn(execute_plan(
                    item,
                    Arc::clone(&runs),
                    control_rx,
                    events_tx.clone(),
                ));
                active = Some((control_tx, task));
            }
            WorkerCommand::Pause { option } => send_control(&active, Control::Pause(option)),
            WorkerCommand::Resume => send_control(&active, Control::Run),
            WorkerCommand::Stop => send_control(&active, Control::Finish(ExitStatus::Stopped)),
            WorkerCommand::Abort => send_control(&active, Control::Finish(ExitStatus::Aborted)),
            WorkerCommand::Halt => send_control(&active, Control::Finish(ExitStatus::Halted)),
            WorkerCommand::QueryRuns => {
                let snapshot = runs.lock().clone();
                let _ = events_tx.send(WorkerEvent::RunListChanged { runs: snapshot }).await;
            }
            WorkerCommand::Shutdown => break,
        }
    }

    // Interrupt whatever is still running before exiting
    if let Some((control, task)) = active.take() {
        let _ = control.send(Control::Finish(ExitStatus::Aborted));
        let _ = task.await;
    }
    drop(events_tx);
    let _ = writer.await;
    Ok(())
}

fn send_control(active: &Option<(watch::Sender<Control>, JoinHandle<()>)>, control: Control) {
    if let Some((sender, _)) = active {
        let _ = sender.send(control);
    }
}

async fn execute_plan(
    item: Item,
    runs: Arc<Mutex<Vec<RunEntry>>>,
    mut control: watch::Receiver<Control>,
    events: mpsc::Sender<WorkerEvent>,
) {
    let item_uid = item.uid().unwrap_or_default().to_string();
    let _ = events.send(WorkerEvent::PlanStarted { item_uid }).await;

    let num_runs = item.kwargs.get("num_runs").and_then(Value::as_u64).unwrap_or(1).max(1);
    let checkpoints = item.kwargs.get("num").and_then(Value::as_u64).unwrap_or(1).max(1);
    let delay = item.kwargs.get("delay").and_then(Value::as_f64).unwrap_or(0.0).max(0.0);

    // The run list covers the current plan only
    runs.lock().clear();
    let _ = events.send(WorkerEvent::RunListChanged { runs: Vec::new() }).await;

    let mut run_uids = Vec::new();
    let mut finish: Option<ExitStatus> = None;

    'plan: for _ in 0..num_runs {
        let run_uid = mint("run");
        run_uids.push(run_uid.clone());
        runs.lock().push(RunEntry { uid: run_uid.clone(), is_open: true, exit_status: None });
        emit_run_list(&runs, &events).await;

        for _ in 0..checkpoints {
            if let Err(status) = checkpoint(delay, &mut control, &events).await {
                finish = Some(status);
                break 'plan;
            }
        }

        if let Some(run) = runs.lock().iter_mut().find(|r| r.uid == run_uid) {
            run.is_open = false;
            run.exit_status = Some("success".into());
        }
        emit_run_list(&runs, &events).await;
    }

    let exit_status = match finish {
        Some(status) => {
            let mut changed = false;
            {
                let mut list = runs.lock();
                for run in list.iter_mut().filter(|r| r.is_open) {
                    run.is_open = false;
                    run.exit_status = Some(status.to_string());
                    changed = true;
                }
            }
            if changed {
                emit_run_list(&runs, &events).await;
            }
            status
        }
        None => ExitStatus::Completed,
    };
    let _ = events.send(WorkerEvent::PlanCompleted { exit_status, run_uids }).await;
}

async fn emit_run_list(runs: &Arc<Mutex<Vec<RunEntry>>>, events: &mpsc::Sender<WorkerEvent>) {
    let snapshot = runs.lock().clone();
    let _ = events.send(WorkerEvent::RunListChanged { runs: snapshot }).await;
}

/// One checkpoint: sleep `delay` seconds. Immediate pauses and
/// stop/abort/halt interrupt the sleep; a deferred pause takes effect at
/// the next checkpoint boundary.
async fn checkpoint(
    delay: f64,
    control: &mut watch::Receiver<Control>,
    events: &mpsc::Sender<WorkerEvent>,
) -> Result<(), ExitStatus> {
    wait_while_paused(control, events).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(delay);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return Ok(()),
            changed = control.changed() => {
                if changed.is_err() {
                    return Err(ExitStatus::Aborted);
                }
                let current = *control.borrow();
                match current {
                    Control::Run => {}
                    Control::Pause(PauseOption::Immediate) => {
                        wait_while_paused(control, events).await?;
                    }
                    // Finish the checkpoint first
                    Control::Pause(PauseOption::Deferred) => {}
                    Control::Finish(status) => return Err(status),
                }
            }
        }
    }
}

async fn wait_while_paused(
    control: &mut watch::Receiver<Control>,
    events: &mpsc::Sender<WorkerEvent>,
) -> Result<(), ExitStatus> {
    loop {
        let current = *control.borrow();
        match current {
            Control::Run => return Ok(()),
            Control::Finish(status) => return Err(status),
            Control::Pause(_) => {
                let _ = events.send(WorkerEvent::PlanPaused).await;
                if control.changed().await.is_err() {
                    return Err(ExitStatus::Aborted);
                }
            }
        }
    }
}
