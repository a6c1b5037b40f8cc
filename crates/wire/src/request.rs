// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request envelope and typed method parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use runq_core::{Item, ManagerStopOption, PauseOption, QueuePos, RunFilter};

/// Raw control-channel request: `{method, params?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Envelope {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), params: None }
    }

    pub fn with_params(
        method: impl Into<String>,
        params: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self { method: method.into(), params: Some(serde_json::to_value(params)?) })
    }

    /// Pre-shared key carried in `params`, if any.
    pub fn key(&self) -> Option<&str> {
        self.params.as_ref()?.get("key")?.as_str()
    }
}

/// Errors from turning an envelope into a typed request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("invalid parameters: {0}")]
    BadParams(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddItemParams {
    pub item: Item,
    pub user: String,
    pub user_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddBatchParams {
    pub items: Vec<Item>,
    pub user: String,
    pub user_group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateItemParams {
    pub item: Item,
    pub user: String,
    pub user_group: String,
    /// When true a fresh UID is minted for the updated item.
    #[serde(default)]
    pub replace: bool,
}

/// Position or UID of an existing queue item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemLocatorParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveItemParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_dest: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_uid: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseParams {
    #[serde(default)]
    pub option: PauseOption,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunsParams {
    #[serde(default)]
    pub option: RunFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupParams {
    pub user_group: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerStopParams {
    #[serde(default)]
    pub option: ManagerStopOption,
}

/// Typed control-channel request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    Status,
    QueueGet,
    QueueItemAdd(AddItemParams),
    QueueItemAddBatch(AddBatchParams),
    QueueItemUpdate(UpdateItemParams),
    QueueItemGet(ItemLocatorParams),
    QueueItemRemove(ItemLocatorParams),
    QueueItemMove(MoveItemParams),
    QueueClear,
    QueueStart,
    QueueStop,
    QueueStopCancel,
    RePause(PauseParams),
    ReResume,
    ReStop,
    ReAbort,
    ReHalt,
    ReRuns(RunsParams),
    HistoryGet,
    HistoryClear,
    EnvironmentOpen,
    EnvironmentClose,
    PlansAllowed(GroupParams),
    DevicesAllowed(GroupParams),
    PermissionsReload,
    ManagerStop(ManagerStopParams),
    ManagerKill,
}

impl TryFrom<Envelope> for Request {
    type Error = RequestError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let params = envelope.params.unwrap_or_else(|| Value::Object(Default::default()));
        let request = match envelope.method.as_str() {
            "ping" => Request::Ping,
            "status" => Request::Status,
            "queue_get" => Request::QueueGet,
            "queue_item_add" => Request::QueueItemAdd(serde_json::from_value(params)?),
            "queue_item_add_batch" => {
                Request::QueueItemAddBatch(serde_json::from_value(params)?)
            }
            "queue_item_update" => Request::QueueItemUpdate(serde_json::from_value(params)?),
            "queue_item_get" => Request::QueueItemGet(serde_json::from_value(params)?),
            "queue_item_remove" => Request::QueueItemRemove(serde_json::from_value(params)?),
            "queue_item_move" => Request::QueueItemMove(serde_json::from_value(params)?),
            "queue_clear" => Request::QueueClear,
            "queue_start" => Request::QueueStart,
            "queue_stop" => Request::QueueStop,
            "queue_stop_cancel" => Request::QueueStopCancel,
            "re_pause" => Request::RePause(serde_json::from_value(params)?),
            "re_resume" => Request::ReResume,
            "re_stop" => Request::ReStop,
            "re_abort" => Request::ReAbort,
            "re_halt" => Request::ReHalt,
            "re_runs" => Request::ReRuns(serde_json::from_value(params)?),
            "history_get" => Request::HistoryGet,
            "history_clear" => Request::HistoryClear,
            "environment_open" => Request::EnvironmentOpen,
            "environment_close" => Request::EnvironmentClose,
            "plans_allowed" => Request::PlansAllowed(serde_json::from_value(params)?),
            "devices_allowed" => Request::DevicesAllowed(serde_json::from_value(params)?),
            "permissions_reload" => Request::PermissionsReload,
            "manager_stop" => Request::ManagerStop(serde_json::from_value(params)?),
            "manager_kill" => Request::ManagerKill,
            other => return Err(RequestError::UnknownMethod(other.to_string())),
        };
        Ok(request)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
