// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed pool for crash recovery.
//!
//! The whole pool is one JSON document rewritten atomically (write to a
//! sibling `.tmp`, then rename) after every mutation. The pool holds at
//! most a queue, a history, and the running-item payload, so a full
//! rewrite stays cheap.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::{Pool, PoolStore, StoreError};

pub struct FileStore {
    path: PathBuf,
    pool: Mutex<Pool>,
}

impl FileStore {
    /// Open the pool at `path`, loading the existing document if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let pool = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Pool::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, pool: Mutex::new(pool) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, pool: &Pool) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(pool)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Pool) -> T) -> Result<T, StoreError> {
        let mut pool = self.pool.lock();
        let out = f(&mut pool);
        self.persist(&pool)?;
        Ok(out)
    }
}

#[async_trait]
impl PoolStore for FileStore {
    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.pool.lock().lists.get(key).map_or(0, |l| l.len()))
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
        self.mutate(|pool| pool.list_insert(key, index, entry))
    }

    async fn list_remove(&self, key: &str, index: usize) -> Result<Option<String>, StoreError> {
        self.mutate(|pool| pool.list_remove(key, index))
    }

    async fn list_push_front(&self, key: &str, entry: String) -> Result<(), StoreError> {
        self.mutate(|pool| pool.lists.entry(key.to_string()).or_default().push_front(entry))
    }

    async fn list_push_back(&self, key: &str, entry: String) -> Result<(), StoreError> {
        self.mutate(|pool| pool.lists.entry(key.to_string()).or_default().push_back(entry))
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.mutate(|pool| pool.lists.get_mut(key).and_then(|list| list.pop_front()))
    }

    async fn list_clear(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|pool| {
            pool.lists.remove(key);
        })
    }

    async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.pool.lock().values.get(key).cloned())
    }

    async fn value_set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.mutate(|pool| {
            pool.values.insert(key.to_string(), value);
        })
    }

    async fn value_clear(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|pool| {
            pool.values.remove(key);
        })
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
