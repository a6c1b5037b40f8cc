// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon bootstrap and shutdown.
//!
//! Startup order: state directory and instance lock, durable pool, plan
//! queue recovery, allowed-items provider, manager loop, control sockets.
//! Shutdown is driven by the manager loop ending (`manager_stop`,
//! `manager_kill`) or by SIGINT, which is translated into a
//! `manager_stop safe_off`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt as _;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt as _;
use tracing_subscriber::EnvFilter;

use runq_core::{ExitStatus, ManagerStopOption};
use runq_storage::{FileStore, PlanQueue, QueueError, StoreError};
use runq_wire::{ManagerStopParams, Request};

use crate::listener::{ListenCtx, Listener};
use crate::manager::{spawn_manager, ManagerExit};
use crate::permissions::{Permissions, PermissionsError};
use crate::worker::ProcessLauncher;
use crate::env;

/// Errors that abort daemon startup or mark an abnormal exit.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine state directory (set RUNQ_STATE_DIR)")]
    NoStateDir,

    #[error("another runqd instance holds the lock at {0}")]
    AlreadyRunning(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("allowed-items error: {0}")]
    Permissions(#[from] PermissionsError),

    #[error("manager terminated by manager_kill")]
    Killed,

    #[error("manager loop failed: {0}")]
    ManagerFailed(String),
}

/// Resolved daemon configuration.
pub struct DaemonConfig {
    pub state_dir: PathBuf,
    pub permissions_path: Option<PathBuf>,
    pub tcp_port: Option<u16>,
    pub control_key: Option<String>,
    pub worker_bin: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, LifecycleError> {
        Ok(Self {
            state_dir: env::state_dir()?,
            permissions_path: env::permissions_path(),
            tcp_port: env::tcp_port(),
            control_key: env::control_key(),
            worker_bin: env::worker_bin(),
        })
    }
}

/// Install the tracing subscriber: `RUNQ_LOG` filter, stderr plus a daily
/// rolling file under the state directory. Returns the appender guard;
/// dropping it flushes buffered log lines.
pub fn init_tracing(state_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_env("RUNQ_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let appender = tracing_appender::rolling::daily(state_dir.join("logs"), "runqd.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file_writer.and(std::io::stderr))
        .init();
    guard
}

/// Run the daemon to completion. `Ok(())` corresponds to process exit 0.
pub async fn run_daemon(config: DaemonConfig) -> Result<(), LifecycleError> {
    fs::create_dir_all(&config.state_dir)?;

    let lock_path = config.state_dir.join("runqd.lock");
    let lock = fs::File::create(&lock_path)?;
    lock.try_lock_exclusive().map_err(|_| LifecycleError::AlreadyRunning(lock_path.clone()))?;

    let store = FileStore::open(config.state_dir.join("pool.json"))?;
    let mut queue = PlanQueue::new(Arc::new(store));
    queue.start().await?;
    // A valid running item left behind by a crash never completed; record
    // it as stopped, which also requeues it at the front.
    if queue.is_item_running().await? {
        warn!("found an interrupted plan from a previous run, requeueing it");
        queue.set_processed_item_as_stopped(ExitStatus::Stopped, Vec::new()).await?;
    }

    let permissions = Arc::new(match &config.permissions_path {
        Some(path) => Permissions::load(path)?,
        None => Permissions::permissive(),
    });

    let launcher = Box::new(ProcessLauncher::new(config.worker_bin.clone()));
    let (handle, mut manager_task) = spawn_manager(queue, launcher, Arc::clone(&permissions));

    let socket_path = config.state_dir.join("runqd.sock");
    let _ = fs::remove_file(&socket_path);
    let unix = UnixListener::bind(&socket_path)?;
    let tcp = match config.tcp_port {
        Some(port) => Some(TcpListener::bind(("0.0.0.0", port)).await?),
        None => None,
    };
    if config.control_key.is_none() {
        warn!("no control-channel key configured, running unencrypted");
    }

    let ctx = Arc::new(ListenCtx {
        manager: handle.clone(),
        permissions,
        control_key: config.control_key.clone(),
    });
    let cancel = CancellationToken::new();
    let listener_task = tokio::spawn(Listener::new(unix, tcp, ctx).run(cancel.clone()));
    info!(socket = %socket_path.display(), tcp_port = ?config.tcp_port, "control channel ready");

    let exit = loop {
        tokio::select! {
            exit = &mut manager_task => break exit,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping the manager");
                let _ = handle
                    .request(Request::ManagerStop(ManagerStopParams {
                        option: ManagerStopOption::SafeOff,
                    }))
                    .await;
            }
        }
    };

    cancel.cancel();
    let _ = listener_task.await;
    let _ = fs::remove_file(&socket_path);

    match exit {
        Ok(ManagerExit::Stopped) => Ok(()),
        Ok(ManagerExit::Killed) => Err(LifecycleError::Killed),
        Err(err) => Err(LifecycleError::ManagerFailed(err.to_string())),
    }
}
