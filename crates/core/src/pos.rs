// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue position addressing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Position in the queue: a zero-based index (negative counts from the
/// back) or one of the symbolic endpoints.
///
/// On the wire this is an integer or the strings `"front"` / `"back"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePos {
    Front,
    Back,
    Index(i64),
}

impl std::fmt::Display for QueuePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueuePos::Front => f.write_str("front"),
            QueuePos::Back => f.write_str("back"),
            QueuePos::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<i64> for QueuePos {
    fn from(index: i64) -> Self {
        QueuePos::Index(index)
    }
}

impl Serialize for QueuePos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueuePos::Front => serializer.serialize_str("front"),
            QueuePos::Back => serializer.serialize_str("back"),
            QueuePos::Index(i) => serializer.serialize_i64(*i),
        }
    }
}

impl<'de> Deserialize<'de> for QueuePos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Index(i64),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Index(i) => Ok(QueuePos::Index(i)),
            Repr::Name(s) => match s.as_str() {
                "front" => Ok(QueuePos::Front),
                "back" => Ok(QueuePos::Back),
                other => Err(serde::de::Error::custom(format!(
                    "parameter 'pos' has incorrect value '{}'",
                    other
                ))),
            },
        }
    }
}

#[cfg(test)]
#[path = "pos_tests.rs"]
mod tests;
