// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allowed-items provider.
//!
//! Loads a TOML file mapping user groups to the plan and device names
//! their members may submit, with optional per-plan kwarg allow-lists:
//!
//! ```toml
//! [groups.primary]
//! plans = ["count", "scan"]
//! devices = ["det1", "det2"]
//!
//! [groups.primary.parameters.scan]
//! kwargs = ["detectors", "num", "delay"]
//! ```
//!
//! The provider is purely functional apart from the cached lists, which
//! `permissions_reload` re-reads from disk.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use runq_core::{Item, ItemType, INSTRUCTION_QUEUE_STOP};

/// Errors from loading or reloading the allowed-items file.
#[derive(Debug, Error)]
pub enum PermissionsError {
    #[error("failed to read allowed-items file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse allowed-items file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Validation failures. Messages are returned verbatim to clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("item must specify a user")]
    MissingUser,

    #[error("item must specify a user group")]
    MissingUserGroup,

    #[error("user group '{0}' is not defined")]
    UnknownGroup(String),

    #[error("plan '{0}' is not allowed for user group '{1}'")]
    PlanNotAllowed(String, String),

    #[error("instruction '{0}' is not supported")]
    UnknownInstruction(String),

    #[error("unexpected keyword argument '{0}' for plan '{1}'")]
    UnexpectedKwarg(String, String),
}

#[derive(Debug, Default, Deserialize)]
struct AllowListsFile {
    #[serde(default)]
    groups: HashMap<String, GroupDef>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct GroupDef {
    #[serde(default)]
    plans: Vec<String>,
    #[serde(default)]
    devices: Vec<String>,
    #[serde(default)]
    parameters: HashMap<String, ParamSpec>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct ParamSpec {
    #[serde(default)]
    kwargs: Vec<String>,
}

/// Per-group allow lists, reloadable from disk.
pub struct Permissions {
    /// `None` means no file is configured and every plan is allowed.
    path: Option<PathBuf>,
    groups: Mutex<HashMap<String, GroupDef>>,
}

impl Permissions {
    /// Load the allow lists from a TOML file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PermissionsError> {
        let path = path.into();
        let groups = read_groups(&path)?;
        Ok(Self { path: Some(path), groups: Mutex::new(groups) })
    }

    /// No file configured: any plan name passes for any group.
    pub fn permissive() -> Self {
        Self { path: None, groups: Mutex::new(HashMap::new()) }
    }

    /// Re-read the allow lists from disk. No-op in permissive mode.
    pub fn reload(&self) -> Result<(), PermissionsError> {
        if let Some(path) = &self.path {
            *self.groups.lock() = read_groups(path)?;
        }
        Ok(())
    }

    /// Allowed plan templates for a group, keyed by name.
    pub fn plans_allowed(&self, user_group: &str) -> Result<Map<String, Value>, ValidationError> {
        self.with_group(user_group, |group| {
            group
                .plans
                .iter()
                .map(|name| {
                    let mut template = json!({"name": name});
                    if let Some(spec) = group.parameters.get(name) {
                        template["kwargs"] = json!(spec.kwargs);
                    }
                    (name.clone(), template)
                })
                .collect()
        })
    }

    /// Allowed devices for a group, keyed by name.
    pub fn devices_allowed(&self, user_group: &str) -> Result<Map<String, Value>, ValidationError> {
        self.with_group(user_group, |group| {
            group.devices.iter().map(|name| (name.clone(), json!({"name": name}))).collect()
        })
    }

    /// Validate a submitted item against the submitter's allow list.
    pub fn validate_item(&self, item: &Item) -> Result<(), ValidationError> {
        if item.user.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::MissingUser);
        }
        let user_group = match item.user_group.as_deref().filter(|g| !g.is_empty()) {
            Some(group) => group,
            None => return Err(ValidationError::MissingUserGroup),
        };

        match item.item_type {
            ItemType::Instruction => {
                if item.name != INSTRUCTION_QUEUE_STOP {
                    return Err(ValidationError::UnknownInstruction(item.name.clone()));
                }
                Ok(())
            }
            ItemType::Plan => {
                if self.path.is_none() {
                    return Ok(());
                }
                let groups = self.groups.lock();
                let group = groups
                    .get(user_group)
                    .ok_or_else(|| ValidationError::UnknownGroup(user_group.to_string()))?;
                if !group.plans.iter().any(|name| name == &item.name) {
                    return Err(ValidationError::PlanNotAllowed(
                        item.name.clone(),
                        user_group.to_string(),
                    ));
                }
                if let Some(spec) = group.parameters.get(&item.name) {
                    for key in item.kwargs.keys() {
                        if !spec.kwargs.iter().any(|allowed| allowed == key) {
                            return Err(ValidationError::UnexpectedKwarg(
                                key.clone(),
                                item.name.clone(),
                            ));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn with_group<T>(
        &self,
        user_group: &str,
        f: impl FnOnce(&GroupDef) -> T,
    ) -> Result<T, ValidationError> {
        if self.path.is_none() {
            // Permissive mode has no named groups; expose an empty list
            return Ok(f(&GroupDef::default()));
        }
        let groups = self.groups.lock();
        groups
            .get(user_group)
            .map(f)
            .ok_or_else(|| ValidationError::UnknownGroup(user_group.to_string()))
    }
}

fn read_groups(path: &std::path::Path) -> Result<HashMap<String, GroupDef>, PermissionsError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| PermissionsError::Read { path: path.to_path_buf(), source })?;
    let file: AllowListsFile = toml::from_str(&text)?;
    Ok(file.groups)
}

#[cfg(test)]
#[path = "permissions_tests.rs"]
mod tests;
