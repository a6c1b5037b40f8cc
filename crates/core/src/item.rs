// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue item data model.
//!
//! An [`Item`] is either a measurement plan or a queue-control instruction,
//! discriminated by [`ItemType`]. Unknown types and unrecognized keys are
//! rejected at the wire boundary rather than carried along silently.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The only instruction name currently recognized by the manager.
pub const INSTRUCTION_QUEUE_STOP: &str = "queue_stop";

/// Kind of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Executable measurement plan, handed to the worker.
    Plan,
    /// Queue-control item, consumed by the manager itself.
    Instruction,
}

crate::simple_display! {
    ItemType {
        Plan => "plan",
        Instruction => "instruction",
    }
}

/// How a processed item terminated. Recorded verbatim into history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Completed,
    Stopped,
    Aborted,
    Halted,
    Failed,
}

crate::simple_display! {
    ExitStatus {
        Completed => "completed",
        Stopped => "stopped",
        Aborted => "aborted",
        Halted => "halted",
        Failed => "failed",
    }
}

/// Execution result attached to history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub exit_status: ExitStatus,
    /// Opaque identifiers of the runs produced during execution, in order.
    pub run_uids: Vec<String>,
}

/// A queue item: a plan or an instruction plus submitter identity.
///
/// `item_uid` is `None` only on freshly submitted items; the queue service
/// stamps one before the item is stored. `result` is present only on
/// history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Item {
    pub item_type: ItemType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_group: Option<String>,
    /// User metadata. Accepted on the wire as a single mapping or as an
    /// ordered sequence of mappings shallow-merged left-wins-on-conflict.
    #[serde(
        default,
        deserialize_with = "deserialize_meta",
        skip_serializing_if = "Map::is_empty"
    )]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ItemResult>,
}

impl Item {
    /// Create a plan item with no arguments.
    pub fn plan(name: impl Into<String>) -> Self {
        Self::new(ItemType::Plan, name)
    }

    /// Create an instruction item.
    pub fn instruction(name: impl Into<String>) -> Self {
        Self::new(ItemType::Instruction, name)
    }

    pub fn new(item_type: ItemType, name: impl Into<String>) -> Self {
        Self {
            item_type,
            name: name.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            item_uid: None,
            user: None,
            user_group: None,
            meta: Map::new(),
            result: None,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.item_uid.as_deref()
    }

    /// True for the `queue_stop` instruction.
    pub fn is_queue_stop(&self) -> bool {
        self.item_type == ItemType::Instruction && self.name == INSTRUCTION_QUEUE_STOP
    }

    /// Copy of this item with a freshly minted UID.
    pub fn with_new_uid(&self) -> Self {
        let mut item = self.clone();
        item.item_uid = Some(crate::id::new_item_uid());
        item
    }

    /// Copy of this item annotated with an execution result.
    pub fn with_result(&self, exit_status: ExitStatus, run_uids: Vec<String>) -> Self {
        let mut item = self.clone();
        item.result = Some(ItemResult { exit_status, run_uids });
        item
    }
}

fn deserialize_meta<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MetaInput {
        One(Map<String, Value>),
        Many(Vec<Map<String, Value>>),
    }

    Ok(match MetaInput::deserialize(deserializer)? {
        MetaInput::One(map) => map,
        MetaInput::Many(maps) => {
            let mut merged = Map::new();
            for map in maps {
                for (key, value) in map {
                    // Leftmost mapping wins on key conflicts
                    merged.entry(key).or_insert(value);
                }
            }
            merged
        }
    })
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
