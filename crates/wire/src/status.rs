// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Published manager status document.

use serde::{Deserialize, Serialize};

use crate::reply::Reply;

/// Status document returned by the `ping` and `status` methods.
///
/// `plan_queue_uid`, `plan_history_uid` and `run_list_uid` are revision
/// tags: a client holding a previous document compares them for equality
/// to detect change without polling full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDoc {
    pub msg: String,
    pub manager_state: String,
    pub items_in_queue: usize,
    pub items_in_history: usize,
    pub running_item_uid: Option<String>,
    pub worker_environment_exists: bool,
    pub queue_stop_pending: bool,
    pub plan_queue_uid: String,
    pub plan_history_uid: String,
    pub run_list_uid: String,
}

impl From<StatusDoc> for Reply {
    fn from(doc: StatusDoc) -> Self {
        let msg = doc.msg.clone();
        let mut reply = Reply::ok().with_msg(msg);
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(doc) {
            for (key, value) in map {
                if key != "msg" {
                    reply.fields.insert(key, value);
                }
            }
        }
        reply
    }
}
