// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! runq-storage: durable key/value pool and the plan queue service.
//!
//! The [`PoolStore`] trait is the seam to the durable store: ordered-list
//! and string-value primitives, nothing queue-specific. [`PlanQueue`] owns
//! every queue-shaped piece of state (queue, history, running slot, UID
//! index, revision tags) and is the only code that touches the store keys.

mod file;
mod queue;
mod store;

pub use file::FileStore;
pub use queue::{
    BatchAddOutcome, ItemOutcome, ItemRef, MoveDest, PlanQueue, QueueError, QueuePlace,
    HISTORY_KEY, QUEUE_KEY, RUNNING_KEY,
};
pub use store::{MemoryStore, PoolStore, StoreError};
