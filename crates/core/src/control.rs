// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Options carried by control-channel requests.

use serde::{Deserialize, Serialize};

/// How urgently the worker should pause the running plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseOption {
    /// Wait until the run engine reaches a safe checkpoint.
    #[default]
    Deferred,
    /// Interrupt at the earliest possible point.
    Immediate,
}

crate::simple_display! {
    PauseOption {
        Deferred => "deferred",
        Immediate => "immediate",
    }
}

/// Safety option for `manager_stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStopOption {
    /// Refuse while the worker is executing a plan.
    #[default]
    SafeOn,
    /// Stop regardless of execution state.
    SafeOff,
}

crate::simple_display! {
    ManagerStopOption {
        SafeOn => "safe_on",
        SafeOff => "safe_off",
    }
}
