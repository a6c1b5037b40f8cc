// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue manager state machine.
//!
//! One cooperative event loop owns the plan queue, the manager state and
//! the worker handle. Control requests and worker lifecycle events arrive
//! on a single channel and are processed in arrival order; nothing else
//! mutates queue state, which is what makes the revision-tag and
//! single-running-item invariants hold by construction.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use runq_core::{
    mint, ExitStatus, Item, ManagerStopOption, QueuePos, RunEntry,
};
use runq_storage::{ItemRef, MoveDest, PlanQueue, QueueError, QueuePlace};
use runq_wire::{
    AddBatchParams, AddItemParams, ItemLocatorParams, MoveItemParams, Reply, Request, StatusDoc,
    UpdateItemParams,
};

use crate::permissions::{Permissions, ValidationError};
use crate::worker::{WorkerAdapter, WorkerCommand, WorkerError, WorkerEvent, WorkerLauncher};

/// Greeting reported in every status document.
const STATUS_MSG: &str = "RE Manager";

/// Message consumed by the manager loop.
pub enum ManagerMsg {
    Request { request: Request, reply: oneshot::Sender<Reply> },
    Worker(WorkerEvent),
}

/// Manager state machine variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Initializing,
    Idle,
    CreatingEnvironment,
    ExecutingQueue,
    Paused,
    ClosingEnvironment,
    Stopping,
}

runq_core::simple_display! {
    ManagerState {
        Initializing => "initializing",
        Idle => "idle",
        CreatingEnvironment => "creating_environment",
        ExecutingQueue => "executing_queue",
        Paused => "paused",
        ClosingEnvironment => "closing_environment",
        Stopping => "stopping",
    }
}

/// How the manager loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerExit {
    /// Clean shutdown via `manager_stop`.
    Stopped,
    /// `manager_kill` fault injection: no cleanup was performed.
    Killed,
}

#[derive(Debug, Error)]
enum ManagerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

enum LoopControl {
    Continue,
    Stop,
}

/// Cheap cloneable handle used by the control-channel listener.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<ManagerMsg>,
}

impl ManagerHandle {
    /// Send a request and await the reply. `None` means the manager is
    /// gone (killed or stopped) and no reply will ever come; the caller
    /// should drop the connection so the client observes a timeout.
    pub async fn request(&self, request: Request) -> Option<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(ManagerMsg::Request { request, reply: reply_tx }).await.ok()?;
        reply_rx.await.ok()
    }
}

/// Build the manager and run it on a background task.
pub fn spawn_manager(
    queue: PlanQueue,
    launcher: Box<dyn WorkerLauncher>,
    permissions: Arc<Permissions>,
) -> (ManagerHandle, JoinHandle<ManagerExit>) {
    let (tx, rx) = mpsc::channel(64);
    let (worker_tx, mut worker_rx) = mpsc::channel(64);

    // Worker events merge into the request loop to get a total order
    let forward = tx.clone();
    tokio::spawn(async move {
        while let Some(event) = worker_rx.recv().await {
            if forward.send(ManagerMsg::Worker(event)).await.is_err() {
                break;
            }
        }
    });

    let manager = QueueManager::new(queue, launcher, permissions, worker_tx);
    let task = tokio::spawn(manager.run(rx));
    (ManagerHandle { tx }, task)
}

pub struct QueueManager {
    queue: PlanQueue,
    launcher: Box<dyn WorkerLauncher>,
    permissions: Arc<Permissions>,
    worker: Option<Box<dyn WorkerAdapter>>,
    worker_events: mpsc::Sender<WorkerEvent>,
    state: ManagerState,
    environment_exists: bool,
    queue_stop_pending: bool,
    run_list: Vec<RunEntry>,
    run_list_uid: String,
}

impl QueueManager {
    pub fn new(
        queue: PlanQueue,
        launcher: Box<dyn WorkerLauncher>,
        permissions: Arc<Permissions>,
        worker_events: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            queue,
            launcher,
            permissions,
            worker: None,
            worker_events,
            state: ManagerState::Initializing,
            environment_exists: false,
            queue_stop_pending: false,
            run_list: Vec::new(),
            run_list_uid: mint("rl"),
        }
    }

    /// Run until `manager_stop` or `manager_kill`.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ManagerMsg>) -> ManagerExit {
        self.state = ManagerState::Idle;
        info!("queue manager started");

        while let Some(msg) = rx.recv().await {
            match msg {
                ManagerMsg::Request { request, reply } => {
                    if matches!(request, Request::ManagerKill) {
                        // Fault injection: die without cleanup or reply;
                        // the client observes a timeout.
                        warn!("manager_kill received, terminating without cleanup");
                        drop(reply);
                        return ManagerExit::Killed;
                    }
                    let (response, control) = self.handle_request(request).await;
                    let _ = reply.send(response);
                    if matches!(control, LoopControl::Stop) {
                        break;
                    }
                }
                ManagerMsg::Worker(event) => self.handle_worker_event(event).await,
            }
        }

        info!("queue manager stopped");
        ManagerExit::Stopped
    }

    async fn handle_request(&mut self, request: Request) -> (Reply, LoopControl) {
        let reply = match request {
            Request::Ping | Request::Status => self.handle_status().await,
            Request::QueueGet => self.handle_queue_get().await,
            Request::QueueItemAdd(params) => self.handle_item_add(params).await,
            Request::QueueItemAddBatch(params) => self.handle_item_add_batch(params).await,
            Request::QueueItemUpdate(params) => self.handle_item_update(params).await,
            Request::QueueItemGet(params) => self.handle_item_get(params).await,
            Request::QueueItemRemove(params) => self.handle_item_remove(params).await,
            Request::QueueItemMove(params) => self.handle_item_move(params).await,
            Request::QueueClear => self.handle_queue_clear().await,
            Request::QueueStart => self.handle_queue_start().await,
            Request::QueueStop => self.handle_queue_stop(),
            Request::QueueStopCancel => self.handle_queue_stop_cancel(),
            Request::RePause(params) => self.handle_re_pause(params.option).await,
            Request::ReResume => self.handle_re_resume().await,
            Request::ReStop => self.handle_re_interrupt(WorkerCommand::Stop).await,
            Request::ReAbort => self.handle_re_interrupt(WorkerCommand::Abort).await,
            Request::ReHalt => self.handle_re_interrupt(WorkerCommand::Halt).await,
            Request::ReRuns(params) => Reply::ok()
                .with("run_list", params.option.apply(&self.run_list))
                .with("run_list_uid", &self.run_list_uid),
            Request::HistoryGet => self.handle_history_get().await,
            Request::HistoryClear => self.handle_history_clear().await,
            Request::EnvironmentOpen => self.handle_environment_open().await,
            Request::EnvironmentClose => self.handle_environment_close().await,
            Request::ManagerStop(params) => return self.handle_manager_stop(params.option).await,
            // Handled by the listener without a manager round-trip
            Request::PlansAllowed(_)
            | Request::DevicesAllowed(_)
            | Request::PermissionsReload => Reply::fail("method is handled by the listener"),
            // Intercepted in the run loop
            Request::ManagerKill => Reply::fail("unreachable"),
        };
        (reply, LoopControl::Continue)
    }

    // ── Status and reads ─────────────────────────────────────────────────

    async fn handle_status(&self) -> Reply {
        match self.status_doc().await {
            Ok(doc) => doc.into(),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn status_doc(&self) -> Result<StatusDoc, QueueError> {
        Ok(StatusDoc {
            msg: STATUS_MSG.to_string(),
            manager_state: self.state.to_string(),
            items_in_queue: self.queue.get_queue_size().await?,
            items_in_history: self.queue.get_history_size().await?,
            running_item_uid: self
                .queue
                .get_running_item_info()
                .await?
                .and_then(|item| item.item_uid),
            worker_environment_exists: self.environment_exists,
            queue_stop_pending: self.queue_stop_pending,
            plan_queue_uid: self.queue.plan_queue_uid().to_string(),
            plan_history_uid: self.queue.plan_history_uid().to_string(),
            run_list_uid: self.run_list_uid.clone(),
        })
    }

    async fn handle_queue_get(&self) -> Reply {
        match self.queue.get_queue_full().await {
            Ok((items, running, tag)) => Reply::ok()
                .with("items", items)
                .with("running_item", running)
                .with("plan_queue_uid", tag),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_history_get(&self) -> Reply {
        match self.queue.get_history().await {
            Ok((items, tag)) => Reply::ok().with("items", items).with("plan_history_uid", tag),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    // ── Queue mutations ──────────────────────────────────────────────────

    fn stamp_and_validate(
        &self,
        mut item: Item,
        user: String,
        user_group: String,
    ) -> Result<Item, ValidationError> {
        item.user = Some(user);
        item.user_group = Some(user_group);
        item.result = None;
        self.permissions.validate_item(&item)?;
        Ok(item)
    }

    async fn handle_item_add(&mut self, params: AddItemParams) -> Reply {
        let result: Result<(Item, usize), ManagerError> = async {
            let item = self.stamp_and_validate(params.item, params.user, params.user_group)?;
            let place =
                QueuePlace::from_parts(params.pos, params.before_uid, params.after_uid)?;
            Ok(self.queue.add_item_to_queue(item, place).await?)
        }
        .await;
        match result {
            Ok((item, qsize)) => Reply::ok().with("item", item).with("qsize", qsize),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_item_add_batch(&mut self, params: AddBatchParams) -> Reply {
        // Validate all items first: the batch is all-or-nothing
        let mut items = Vec::with_capacity(params.items.len());
        let mut results = Vec::with_capacity(params.items.len());
        let mut valid = true;
        for item in params.items {
            let mut item = item;
            item.user = Some(params.user.clone());
            item.user_group = Some(params.user_group.clone());
            item.result = None;
            let (success, msg) = match self.permissions.validate_item(&item) {
                Ok(()) => (true, String::new()),
                Err(err) => {
                    valid = false;
                    (false, err.to_string())
                }
            };
            results.push(serde_json::json!({"success": success, "msg": msg}));
            items.push(item);
        }

        if !valid {
            let qsize = self.queue.get_queue_size().await.unwrap_or(0);
            return Reply::fail("failed to add one or more items")
                .with("items", items)
                .with("results", results)
                .with("qsize", qsize);
        }

        match self.queue.add_batch_to_queue(items).await {
            Ok(outcome) => {
                let results: Vec<_> = outcome
                    .results
                    .iter()
                    .map(|r| serde_json::json!({"success": r.success, "msg": r.msg}))
                    .collect();
                let reply = if outcome.success {
                    Reply::ok()
                } else {
                    Reply::fail("failed to add one or more items")
                };
                reply
                    .with("items", outcome.items)
                    .with("results", results)
                    .with("qsize", outcome.qsize)
            }
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_item_update(&mut self, params: UpdateItemParams) -> Reply {
        let result: Result<(Item, usize), ManagerError> = async {
            let mut item = self.stamp_and_validate(params.item, params.user, params.user_group)?;
            let target_uid = match item.item_uid.clone() {
                Some(uid) => uid,
                None => return Err(QueueError::MissingUid.into()),
            };
            if params.replace {
                // Mint a fresh UID for the updated item
                item.item_uid = None;
            }
            Ok(self.queue.replace_item(item, &target_uid).await?)
        }
        .await;
        match result {
            Ok((item, qsize)) => Reply::ok().with("item", item).with("qsize", qsize),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_item_get(&self, params: ItemLocatorParams) -> Reply {
        let result: Result<Item, ManagerError> = async {
            let item_ref = ItemRef::from_parts(params.pos, params.uid)?
                .unwrap_or(ItemRef::Pos(QueuePos::Back));
            Ok(self.queue.get_item(item_ref).await?)
        }
        .await;
        match result {
            Ok(item) => Reply::ok().with("item", item),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_item_remove(&mut self, params: ItemLocatorParams) -> Reply {
        let result: Result<(Item, usize), ManagerError> = async {
            let item_ref = ItemRef::from_parts(params.pos, params.uid)?
                .unwrap_or(ItemRef::Pos(QueuePos::Back));
            Ok(self.queue.pop_item(item_ref).await?)
        }
        .await;
        match result {
            Ok((item, qsize)) => Reply::ok().with("item", item).with("qsize", qsize),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_item_move(&mut self, params: MoveItemParams) -> Reply {
        let result: Result<(Item, usize), ManagerError> = async {
            let src = ItemRef::from_parts(params.pos, params.uid)?
                .ok_or(QueueError::SourceNotSpecified)?;
            let dest =
                MoveDest::from_parts(params.pos_dest, params.before_uid, params.after_uid)?
                    .ok_or(QueueError::DestinationNotSpecified)?;
            Ok(self.queue.move_item(src, dest).await?)
        }
        .await;
        match result {
            Ok((item, qsize)) => Reply::ok().with("item", item).with("qsize", qsize),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_queue_clear(&mut self) -> Reply {
        match self.queue.clear_queue().await {
            Ok(()) => Reply::ok().with_msg("plan queue is now empty"),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_history_clear(&mut self) -> Reply {
        match self.queue.clear_history().await {
            Ok(()) => Reply::ok().with_msg("plan history is now empty"),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    // ── Execution control ────────────────────────────────────────────────

    async fn handle_queue_start(&mut self) -> Reply {
        if !self.environment_exists {
            return Reply::fail("worker environment does not exist");
        }
        if self.state != ManagerState::Idle {
            return Reply::fail(format!(
                "cannot start the queue while the manager is in state '{}'",
                self.state
            ));
        }
        self.state = ManagerState::ExecutingQueue;
        match self.start_next_item().await {
            Ok(()) => Reply::ok(),
            Err(err) => {
                self.state = ManagerState::Idle;
                Reply::fail(err.to_string())
            }
        }
    }

    /// Advance the queue: consume a leading `queue_stop` instruction or
    /// hand the front plan to the worker. Returns to idle when the queue
    /// is exhausted or a stop was requested.
    async fn start_next_item(&mut self) -> Result<(), ManagerError> {
        if self.queue_stop_pending {
            self.queue_stop_pending = false;
            self.state = ManagerState::Idle;
            return Ok(());
        }

        let front = match self.queue.get_item(ItemRef::Pos(QueuePos::Front)).await {
            Ok(item) => Some(item),
            Err(QueueError::QueueEmpty) => None,
            Err(err) => return Err(err.into()),
        };

        match front {
            None => {
                self.state = ManagerState::Idle;
            }
            Some(item) if item.is_queue_stop() => {
                // Consumed without a history record; execution stops here
                self.queue.pop_item(ItemRef::Pos(QueuePos::Front)).await?;
                debug!("queue_stop instruction consumed");
                self.state = ManagerState::Idle;
            }
            Some(_) => {
                let item = match self.queue.set_next_item_as_running().await? {
                    Some(item) => item,
                    None => {
                        // An item is already running; nothing to start
                        return Ok(());
                    }
                };
                let worker = match self.worker.as_mut() {
                    Some(worker) => worker,
                    None => {
                        self.state = ManagerState::Idle;
                        return Err(WorkerError::Spawn("worker is not available".into()).into());
                    }
                };
                worker.send(WorkerCommand::Execute { item }).await?;
                self.state = ManagerState::ExecutingQueue;
            }
        }
        Ok(())
    }

    fn handle_queue_stop(&mut self) -> Reply {
        match self.state {
            ManagerState::ExecutingQueue | ManagerState::Paused => {
                self.queue_stop_pending = true;
                Reply::ok()
            }
            _ => Reply::fail("queue is not executing"),
        }
    }

    fn handle_queue_stop_cancel(&mut self) -> Reply {
        match self.state {
            ManagerState::ExecutingQueue | ManagerState::Paused => {
                self.queue_stop_pending = false;
                Reply::ok()
            }
            _ => Reply::fail("queue is not executing"),
        }
    }

    async fn handle_re_pause(&mut self, option: runq_core::PauseOption) -> Reply {
        if self.state != ManagerState::ExecutingQueue {
            return Reply::fail("cannot pause: the queue is not executing");
        }
        match self.send_to_worker(WorkerCommand::Pause { option }).await {
            Ok(()) => Reply::ok(),
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_re_resume(&mut self) -> Reply {
        if self.state != ManagerState::Paused {
            return Reply::fail("cannot resume: the plan is not paused");
        }
        match self.send_to_worker(WorkerCommand::Resume).await {
            Ok(()) => {
                self.state = ManagerState::ExecutingQueue;
                Reply::ok()
            }
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn handle_re_interrupt(&mut self, command: WorkerCommand) -> Reply {
        if self.state != ManagerState::Paused {
            return Reply::fail("cannot interrupt: the plan is not paused");
        }
        match self.send_to_worker(command).await {
            Ok(()) => {
                // The outcome arrives as a plan_completed event
                self.state = ManagerState::ExecutingQueue;
                Reply::ok()
            }
            Err(err) => Reply::fail(err.to_string()),
        }
    }

    async fn send_to_worker(&mut self, command: WorkerCommand) -> Result<(), WorkerError> {
        match self.worker.as_mut() {
            Some(worker) => worker.send(command).await,
            None => Err(WorkerError::Spawn("worker is not available".into())),
        }
    }

    // ── Environment lifecycle ────────────────────────────────────────────

    async fn handle_environment_open(&mut self) -> Reply {
        if self.environment_exists {
            return Reply::fail("worker environment already exists");
        }
        if self.state != ManagerState::Idle {
            return Reply::fail(format!(
                "cannot open the environment while the manager is in state '{}'",
                self.state
            ));
        }
        self.state = ManagerState::CreatingEnvironment;
        match self.launcher.spawn(self.worker_events.clone()).await {
            Ok(worker) => {
                self.worker = Some(worker);
                Reply::ok()
            }
            Err(err) => {
                self.state = ManagerState::Idle;
                Reply::fail(err.to_string())
            }
        }
    }

    async fn handle_environment_close(&mut self) -> Reply {
        if !self.environment_exists {
            return Reply::fail("worker environment does not exist");
        }
        if self.state != ManagerState::Idle {
            return Reply::fail(format!(
                "cannot close the environment while the manager is in state '{}'",
                self.state
            ));
        }
        self.state = ManagerState::ClosingEnvironment;
        match self.send_to_worker(WorkerCommand::Shutdown).await {
            Ok(()) => Reply::ok(),
            Err(err) => {
                self.state = ManagerState::Idle;
                Reply::fail(err.to_string())
            }
        }
    }

    async fn handle_manager_stop(&mut self, option: ManagerStopOption) -> (Reply, LoopControl) {
        let executing =
            matches!(self.state, ManagerState::ExecutingQueue | ManagerState::Paused);
        if option == ManagerStopOption::SafeOn && executing {
            return (
                Reply::fail("cannot stop the manager while the queue is executing"),
                LoopControl::Continue,
            );
        }

        self.state = ManagerState::Stopping;
        if let Some(mut worker) = self.worker.take() {
            if let Err(err) = worker.shutdown().await {
                warn!(%err, "worker shutdown failed during manager stop");
            }
            self.environment_exists = false;
        }
        (Reply::ok().with_msg("manager stopped"), LoopControl::Stop)
    }

    // ── Worker events ────────────────────────────────────────────────────

    async fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Ready => {
                self.environment_exists = true;
                if self.state == ManagerState::CreatingEnvironment {
                    self.state = ManagerState::Idle;
                }
                info!("worker environment is ready");
            }
            WorkerEvent::Exited => {
                let was_executing =
                    matches!(self.state, ManagerState::ExecutingQueue | ManagerState::Paused);
                self.worker = None;
                self.environment_exists = false;
                self.queue_stop_pending = false;
                if was_executing {
                    // The worker died under a running plan: record the
                    // failure and stop the queue
                    error!("worker exited unexpectedly while executing a plan");
                    if let Err(err) = self
                        .queue
                        .set_processed_item_as_completed(ExitStatus::Failed, Vec::new())
                        .await
                    {
                        error!(%err, "failed to record lost plan");
                    }
                } else {
                    info!("worker environment closed");
                }
                self.state = ManagerState::Idle;
            }
            WorkerEvent::PlanStarted { item_uid } => {
                debug!(%item_uid, "plan started");
            }
            WorkerEvent::PlanPaused => {
                if self.state == ManagerState::ExecutingQueue {
                    self.state = ManagerState::Paused;
                }
            }
            WorkerEvent::PlanCompleted { exit_status, run_uids } => {
                self.handle_plan_completed(exit_status, run_uids).await;
            }
            WorkerEvent::RunListChanged { runs } => {
                self.run_list = runs;
                self.run_list_uid = mint("rl");
            }
        }
    }

    async fn handle_plan_completed(&mut self, exit_status: ExitStatus, run_uids: Vec<String>) {
        let result = match exit_status {
            ExitStatus::Stopped => {
                self.queue.set_processed_item_as_stopped(exit_status, run_uids).await
            }
            _ => self.queue.set_processed_item_as_completed(exit_status, run_uids).await,
        };
        match result {
            Ok(Some(item)) => debug!(name = %item.name, %exit_status, "plan processed"),
            Ok(None) => warn!("plan completion event with no running item"),
            Err(err) => error!(%err, "failed to record processed plan"),
        }

        match exit_status {
            ExitStatus::Completed => {
                // Keep draining the queue unless a stop is pending
                self.state = ManagerState::ExecutingQueue;
                if let Err(err) = self.start_next_item().await {
                    error!(%err, "failed to start next item");
                    self.state = ManagerState::Idle;
                }
            }
            _ => {
                // stopped/aborted/halted/failed all stop the queue
                self.queue_stop_pending = false;
                self.state = ManagerState::Idle;
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
