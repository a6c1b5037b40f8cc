// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! runq-worker: worker process executing plans for the queue manager.

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = runq_daemon::worker_proc::run().await {
        eprintln!("runq-worker: {}", err);
        std::process::exit(1);
    }
}
