// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live run list reported by the worker.
//!
//! A plan may open and close several observation runs while it executes.
//! The worker reports every transition; the manager caches the latest
//! list and serves filtered views of it.

use serde::{Deserialize, Serialize};

/// One entry in the worker's run list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub uid: String,
    pub is_open: bool,
    /// Exit status reported by the run engine when the run closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<String>,
}

/// Filter applied to the run list by the `re_runs` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunFilter {
    #[default]
    All,
    /// Alias of `all`: the full list for the currently executed plan.
    Active,
    Open,
    Closed,
}

impl RunFilter {
    pub fn apply(self, runs: &[RunEntry]) -> Vec<RunEntry> {
        match self {
            RunFilter::All | RunFilter::Active => runs.to_vec(),
            RunFilter::Open => runs.iter().filter(|r| r.is_open).cloned().collect(),
            RunFilter::Closed => runs.iter().filter(|r| !r.is_open).cloned().collect(),
        }
    }
}

crate::simple_display! {
    RunFilter {
        All => "all",
        Active => "active",
        Open => "open",
        Closed => "closed",
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
