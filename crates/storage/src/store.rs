// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable pool primitives.
//!
//! The store exposes ordered lists and string values keyed by name. All
//! queue semantics live above this seam in [`crate::PlanQueue`]; a store
//! implementation only has to keep lists ordered and operations atomic
//! with respect to one another.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered-list and string-value primitives backing the plan queue.
///
/// Indices are zero-based from the front. `list_insert` clamps an index
/// past the end to an append; read and remove operations return `None`
/// for out-of-range indices and leave range policy to the caller.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;
    async fn list_all(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn list_get(&self, key: &str, index: usize) -> Result<Option<String>, StoreError>;
    async fn list_insert(&self, key: &str, index: usize, entry: String) -> Result<(), StoreError>;
    async fn list_remove(&self, key: &str, index: usize) -> Result<Option<String>, StoreError>;
    async fn list_push_front(&self, key: &str, entry: String) -> Result<(), StoreError>;
    async fn list_push_back(&self, key: &str, entry: String) -> Result<(), StoreError>;
    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn list_clear(&self, key: &str) -> Result<(), StoreError>;

    async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn value_set(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn value_clear(&self, key: &str) -> Result<(), StoreError>;
}

/// Plain data shared by the store implementations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Pool {
    #[serde(default)]
    pub lists: HashMap<String, VecDeque<String>>,
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl Pool {
    pub fn list_insert(&mut self, key: &str, index: usize, entry: String) {
        let list = self.lists.entry(key.to_string()).or_default();
        let index = index.min(list.len());
        list.insert(index, entry);
    }

    pub fn list_remove(&mut self, key: &str, index: usize) -> Option<String> {
        self.lists.get_mut(key).and_then(|list| list.remove(index))
    }
}

/// Volatile in-memory store. Used by tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryStore {
    pool: parking_lot::Mutex<Pool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.pool.lock().lists.get(key).map_or(0, VecDeque::len))
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .pool
            .lock()
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_get(&self, key: &str, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.pool.lock().lists.get(key).and_then(|list| list.get(index).cloned()))
    }

    async fn list_insert(&self, key: &str, index: usize, entry: String) -> Result<(), StoreError> {
        self.pool.lock().list_insert(key, index, entry);
        Ok(())
    }

    async fn list_remove(&self, key: &str, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.pool.lock().list_remove(key, index))
    }

    async fn list_push_front(&self, key: &str, entry: String) -> Result<(), StoreError> {
        self.pool.lock().lists.entry(key.to_string()).or_default().push_front(entry);
        Ok(())
    }

    async fn list_push_back(&self, key: &str, entry: String) -> Result<(), StoreError> {
        self.pool.lock().lists.entry(key.to_string()).or_default().push_back(entry);
        Ok(())
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.pool.lock().lists.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn list_clear(&self, key: &str) -> Result<(), StoreError> {
        self.pool.lock().lists.remove(key);
        Ok(())
    }

    async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.pool.lock().values.get(key).cloned())
    }

    async fn value_set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.pool.lock().values.insert(key.to_string(), value);
        Ok(())
    }

    async fn value_clear(&self, key: &str) -> Result<(), StoreError> {
        self.pool.lock().values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
