// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-channel protocol for the queue manager.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Requests are `{method, params?}`; every response carries a boolean
//! `success` and a string `msg`, plus method-specific fields.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod reply;
mod request;
mod status;

pub use frame::{
    decode, encode, read_message, read_request, write_message, write_reply, ProtocolError,
    MAX_FRAME_BYTES,
};
pub use reply::Reply;
pub use request::{
    AddBatchParams, AddItemParams, Envelope, GroupParams, ItemLocatorParams, ManagerStopParams,
    MoveItemParams, PauseParams, Request, RequestError, RunsParams, UpdateItemParams,
};
pub use status::StatusDoc;
