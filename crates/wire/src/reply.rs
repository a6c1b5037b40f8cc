// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Control-channel response: `{success, msg, ...method-specific fields}`.
///
/// Method-specific fields are flattened next to the envelope keys, so the
/// wire shape matches what clients of the original service expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Reply {
    pub fn ok() -> Self {
        Self { success: true, msg: String::new(), fields: Map::new() }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into(), fields: Map::new() }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    /// Attach a method-specific field.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
