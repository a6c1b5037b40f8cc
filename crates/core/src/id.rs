// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifier minting.
//!
//! Item UIDs and collection revision tags are fresh random strings. Clients
//! compare them for equality only; no ordering or content is implied. Tags
//! are never derived from the data they describe, so two different mutation
//! sequences that happen to produce the same queue still get distinct tags.

/// Mint a fresh identifier with the given prefix, e.g. `item-V1StGXR8_Z5jdHi6B-myT`.
pub fn mint(prefix: &str) -> String {
    format!("{}-{}", prefix, nanoid::nanoid!(21))
}

/// Mint a UID suitable for stamping onto a queue item.
pub fn new_item_uid() -> String {
    mint("item")
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
