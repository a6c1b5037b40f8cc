// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! runqd: run-engine queue server daemon.

use runq_daemon::lifecycle::{init_tracing, run_daemon, DaemonConfig, LifecycleError};

#[tokio::main]
async fn main() {
    let config = match DaemonConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("runqd: {}", err);
            std::process::exit(2);
        }
    };

    let _guard = init_tracing(&config.state_dir);

    match run_daemon(config).await {
        Ok(()) => {}
        Err(err @ LifecycleError::Killed) => {
            eprintln!("runqd: {}", err);
            std::process::exit(3);
        }
        Err(err) => {
            eprintln!("runqd: {}", err);
            std::process::exit(1);
        }
    }
}
