// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan queue service.
//!
//! Sole owner of the queue, the history, the running-item slot, the UID
//! index, and the revision tags. Every mutation goes through this type;
//! callers never touch the store keys directly. The service itself is not
//! synchronized: the manager loop is its single owner, which is the
//! serialization mechanism.
//!
//! Revision tags (`plan_queue_uid`, `plan_history_uid`) are re-minted on
//! every observable change to the respective collection and left alone by
//! no-op calls and failed operations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use runq_core::{mint, new_item_uid, ExitStatus, Item, QueuePos};

use crate::store::{PoolStore, StoreError};

/// Store key of the plan queue list.
pub const QUEUE_KEY: &str = "plan_queue";
/// Store key of the history list.
pub const HISTORY_KEY: &str = "plan_history";
/// Store key of the running-item payload.
pub const RUNNING_KEY: &str = "running_item";

/// Errors surfaced by queue operations. All of them leave the queue, the
/// history, and the revision tags untouched.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("ambiguous parameters: {0}")]
    Ambiguous(&'static str),

    #[error("index {0} is out of range")]
    OutOfRange(i64),

    #[error("queue is empty")]
    QueueEmpty,

    #[error("item with UID '{0}' is not in the queue")]
    UidNotFound(String),

    #[error("item with UID '{0}' is currently running")]
    CurrentlyRunning(String),

    #[error("cannot remove an item which is currently running")]
    RemoveRunning,

    #[error("cannot insert a plan in the queue before a currently running plan")]
    InsertBeforeRunning,

    #[error("item with UID '{0}' is already in the queue")]
    UidCollision(String),

    #[error("item does not have UID")]
    MissingUid,

    #[error("source plan ({0}) was not found")]
    SourceNotFound(String),

    #[error("destination plan ({0}) was not found")]
    DestinationNotFound(String),

    #[error("source position or UID is not specified")]
    SourceNotSpecified,

    #[error("destination position or UID is not specified")]
    DestinationNotSpecified,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Store(StoreError::Json(err))
    }
}

/// Where to insert a new item. Exactly one positional form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuePlace {
    Pos(QueuePos),
    Before(String),
    After(String),
}

impl QueuePlace {
    /// Combine the three optional wire parameters, rejecting conflicts.
    pub fn from_parts(
        pos: Option<QueuePos>,
        before_uid: Option<String>,
        after_uid: Option<String>,
    ) -> Result<Option<Self>, QueueError> {
        match (pos, before_uid, after_uid) {
            (None, None, None) => Ok(None),
            (Some(pos), None, None) => Ok(Some(QueuePlace::Pos(pos))),
            (None, Some(uid), None) => Ok(Some(QueuePlace::Before(uid))),
            (None, None, Some(uid)) => Ok(Some(QueuePlace::After(uid))),
            _ => Err(QueueError::Ambiguous(
                "only one of 'pos', 'before_uid' and 'after_uid' may be specified",
            )),
        }
    }
}

/// Reference to an existing queue item by position or UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Pos(QueuePos),
    Uid(String),
}

impl ItemRef {
    pub fn from_parts(
        pos: Option<QueuePos>,
        uid: Option<String>,
    ) -> Result<Option<Self>, QueueError> {
        match (pos, uid) {
            (None, None) => Ok(None),
            (Some(pos), None) => Ok(Some(ItemRef::Pos(pos))),
            (None, Some(uid)) => Ok(Some(ItemRef::Uid(uid))),
            (Some(_), Some(_)) => {
                Err(QueueError::Ambiguous("'pos' and 'uid' are mutually exclusive"))
            }
        }
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemRef::Pos(pos) => write!(f, "position {}", pos),
            ItemRef::Uid(uid) => write!(f, "UID '{}'", uid),
        }
    }
}

/// Destination of a move: a position or a spot relative to another item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDest {
    Pos(QueuePos),
    Before(String),
    After(String),
}

impl MoveDest {
    pub fn from_parts(
        pos_dest: Option<QueuePos>,
        before_uid: Option<String>,
        after_uid: Option<String>,
    ) -> Result<Option<Self>, QueueError> {
        match (pos_dest, before_uid, after_uid) {
            (None, None, None) => Ok(None),
            (Some(pos), None, None) => Ok(Some(MoveDest::Pos(pos))),
            (None, Some(uid), None) => Ok(Some(MoveDest::Before(uid))),
            (None, None, Some(uid)) => Ok(Some(MoveDest::After(uid))),
            _ => Err(QueueError::Ambiguous(
                "only one of 'pos_dest', 'before_uid' and 'after_uid' may be specified",
            )),
        }
    }
}

/// Per-item outcome of a batch insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub success: bool,
    pub msg: String,
}

/// Result of [`PlanQueue::add_batch_to_queue`].
#[derive(Debug, Clone)]
pub struct BatchAddOutcome {
    /// False when any item failed validation; nothing was inserted then.
    pub success: bool,
    /// Stored items (with stamped UIDs) on success, the input items otherwise.
    pub items: Vec<Item>,
    pub results: Vec<ItemOutcome>,
    pub qsize: usize,
}

pub struct PlanQueue {
    store: Arc<dyn PoolStore>,
    /// UID → current item record, covering the queue plus the running slot.
    /// Rebuilt from the store on [`PlanQueue::start`]; never persisted.
    uid_index: HashMap<String, Item>,
    plan_queue_uid: String,
    plan_history_uid: String,
}

impl PlanQueue {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self {
            store,
            uid_index: HashMap::new(),
            plan_queue_uid: mint("pq"),
            plan_history_uid: mint("ph"),
        }
    }

    /// Connect to the store: discard malformed residue and rebuild the UID
    /// index by scanning the queue and the running slot.
    pub async fn start(&mut self) -> Result<(), QueueError> {
        self.queue_clean().await?;
        self.uid_index.clear();
        for item in self.read_queue().await? {
            if let Some(uid) = item.uid() {
                self.uid_index.insert(uid.to_string(), item.clone());
            }
        }
        if let Some(item) = self.running_item().await? {
            if let Some(uid) = item.uid() {
                self.uid_index.insert(uid.to_string(), item.clone());
            }
        }
        Ok(())
    }

    /// Drop queue entries without a valid UID and clear a running-slot
    /// payload that does not parse to an item with a UID (e.g. residue of
    /// a manager killed mid-plan).
    async fn queue_clean(&self) -> Result<(), QueueError> {
        let entries = self.store.list_all(QUEUE_KEY).await?;
        let kept: Vec<&String> = entries
            .iter()
            .filter(|entry| {
                serde_json::from_str::<Item>(entry).is_ok_and(|item| item.uid().is_some())
            })
            .collect();
        if kept.len() != entries.len() {
            warn!(dropped = entries.len() - kept.len(), "discarding malformed queue entries");
            self.store.list_clear(QUEUE_KEY).await?;
            for entry in kept {
                self.store.list_push_back(QUEUE_KEY, entry.clone()).await?;
            }
        }

        if let Some(payload) = self.store.value_get(RUNNING_KEY).await? {
            let valid =
                serde_json::from_str::<Item>(&payload).is_ok_and(|item| item.uid().is_some());
            if !valid {
                warn!("discarding malformed running-item payload");
                self.store.value_clear(RUNNING_KEY).await?;
            }
        }
        Ok(())
    }

    pub fn plan_queue_uid(&self) -> &str {
        &self.plan_queue_uid
    }

    pub fn plan_history_uid(&self) -> &str {
        &self.plan_history_uid
    }

    fn bump_queue_tag(&mut self) {
        self.plan_queue_uid = mint("pq");
    }

    fn bump_history_tag(&mut self) {
        self.plan_history_uid = mint("ph");
    }

    pub fn new_item_uid(&self) -> String {
        new_item_uid()
    }

    /// Copy of `item` with a freshly minted UID.
    pub fn set_new_item_uid(&self, item: &Item) -> Item {
        item.with_new_uid()
    }

    async fn read_queue(&self) -> Result<Vec<Item>, QueueError> {
        let mut items = Vec::new();
        for entry in self.store.list_all(QUEUE_KEY).await? {
            items.push(serde_json::from_str(&entry)?);
        }
        Ok(items)
    }

    async fn running_item(&self) -> Result<Option<Item>, QueueError> {
        match self.store.value_get(RUNNING_KEY).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn running_uid(&self) -> Result<Option<String>, QueueError> {
        Ok(self.running_item().await?.and_then(|item| item.item_uid))
    }

    pub async fn get_queue(&self) -> Result<(Vec<Item>, String), QueueError> {
        Ok((self.read_queue().await?, self.plan_queue_uid.clone()))
    }

    pub async fn get_queue_full(&self) -> Result<(Vec<Item>, Option<Item>, String), QueueError> {
        Ok((self.read_queue().await?, self.running_item().await?, self.plan_queue_uid.clone()))
    }

    pub async fn get_queue_size(&self) -> Result<usize, QueueError> {
        Ok(self.store.list_len(QUEUE_KEY).await?)
    }

    pub async fn get_history(&self) -> Result<(Vec<Item>, String), QueueError> {
        let mut items = Vec::new();
        for entry in self.store.list_all(HISTORY_KEY).await? {
            items.push(serde_json::from_str(&entry)?);
        }
        Ok((items, self.plan_history_uid.clone()))
    }

    pub async fn get_history_size(&self) -> Result<usize, QueueError> {
        Ok(self.store.list_len(HISTORY_KEY).await?)
    }

    pub async fn is_item_running(&self) -> Result<bool, QueueError> {
        Ok(self.store.value_get(RUNNING_KEY).await?.is_some())
    }

    pub async fn get_running_item_info(&self) -> Result<Option<Item>, QueueError> {
        self.running_item().await
    }

    /// Number of UIDs tracked across the queue and the running slot.
    pub fn uid_count(&self) -> usize {
        self.uid_index.len()
    }

    /// Insert an item. A missing UID is stamped; a colliding UID fails.
    /// `place` defaults to the back of the queue.
    pub async fn add_item_to_queue(
        &mut self,
        item: Item,
        place: Option<QueuePlace>,
    ) -> Result<(Item, usize), QueueError> {
        let mut item = item;
        if item.item_uid.is_none() {
            item.item_uid = Some(new_item_uid());
        }
        let uid = item.item_uid.clone().ok_or(QueueError::MissingUid)?;
        if self.uid_index.contains_key(&uid) {
            return Err(QueueError::UidCollision(uid));
        }

        let len = self.get_queue_size().await?;
        let index = match &place {
            None => len,
            Some(QueuePlace::Pos(pos)) => insert_index(*pos, len),
            Some(QueuePlace::Before(target)) => {
                if self.running_uid().await?.as_deref() == Some(target.as_str()) {
                    return Err(QueueError::InsertBeforeRunning);
                }
                let items = self.read_queue().await?;
                find_index(&items, target)
                    .ok_or_else(|| QueueError::UidNotFound(target.clone()))?
            }
            Some(QueuePlace::After(target)) => {
                if self.running_uid().await?.as_deref() == Some(target.as_str()) {
                    // Right after the running item means the front of the queue
                    0
                } else {
                    let items = self.read_queue().await?;
                    find_index(&items, target)
                        .ok_or_else(|| QueueError::UidNotFound(target.clone()))?
                        + 1
                }
            }
        };

        self.store.list_insert(QUEUE_KEY, index, serde_json::to_string(&item)?).await?;
        self.uid_index.insert(uid, item.clone());
        self.bump_queue_tag();
        Ok((item, len + 1))
    }

    /// All-or-nothing batch insert at the back of the queue.
    pub async fn add_batch_to_queue(
        &mut self,
        items: Vec<Item>,
    ) -> Result<BatchAddOutcome, QueueError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::with_capacity(items.len());
        let mut success = true;
        for item in &items {
            let duplicate = item.uid().is_some_and(|uid| {
                self.uid_index.contains_key(uid) || !seen.insert(uid.to_string())
            });
            let outcome = if duplicate {
                ItemOutcome {
                    success: false,
                    msg: format!(
                        "item with UID '{}' is already in the queue",
                        item.uid().unwrap_or_default()
                    ),
                }
            } else {
                ItemOutcome { success: true, msg: String::new() }
            };
            success &= outcome.success;
            results.push(outcome);
        }

        if !success {
            let qsize = self.get_queue_size().await?;
            return Ok(BatchAddOutcome { success, items, results, qsize });
        }

        let mut stored = Vec::with_capacity(items.len());
        let mut qsize = self.get_queue_size().await?;
        for item in items {
            let (item, size) = self.add_item_to_queue(item, None).await?;
            stored.push(item);
            qsize = size;
        }
        Ok(BatchAddOutcome { success, items: stored, results, qsize })
    }

    /// Replace the queue item identified by `target_uid`.
    ///
    /// The new item may keep the same UID (update in place), carry a
    /// different non-colliding UID (re-key), or carry none (a fresh UID is
    /// minted). History entries referencing the old UID are not rewritten;
    /// clients that cached the old UID will see stale references.
    pub async fn replace_item(
        &mut self,
        new_item: Item,
        target_uid: &str,
    ) -> Result<(Item, usize), QueueError> {
        if self.running_uid().await?.as_deref() == Some(target_uid) {
            return Err(QueueError::CurrentlyRunning(target_uid.to_string()));
        }
        let items = self.read_queue().await?;
        let index = find_index(&items, target_uid)
            .ok_or_else(|| QueueError::UidNotFound(target_uid.to_string()))?;

        let mut new_item = new_item;
        if new_item.item_uid.is_none() {
            new_item.item_uid = Some(new_item_uid());
        }
        let new_uid = new_item.item_uid.clone().ok_or(QueueError::MissingUid)?;
        if new_uid != target_uid && self.uid_index.contains_key(&new_uid) {
            return Err(QueueError::UidCollision(new_uid));
        }

        self.store.list_remove(QUEUE_KEY, index).await?;
        self.store.list_insert(QUEUE_KEY, index, serde_json::to_string(&new_item)?).await?;
        self.uid_index.remove(target_uid);
        self.uid_index.insert(new_uid, new_item.clone());
        self.bump_queue_tag();
        Ok((new_item, items.len()))
    }

    /// Move an item. Destination positions must reference an existing item
    /// (no clamping). A move whose destination resolves to the item itself
    /// succeeds without touching the queue or the revision tag.
    pub async fn move_item(
        &mut self,
        src: ItemRef,
        dest: MoveDest,
    ) -> Result<(Item, usize), QueueError> {
        let items = self.read_queue().await?;
        let len = items.len();

        let src_index = match &src {
            ItemRef::Pos(pos) => read_index(*pos, len)
                .map_err(|_| QueueError::SourceNotFound(format!("position {}", pos)))?,
            ItemRef::Uid(uid) => find_index(&items, uid)
                .ok_or_else(|| QueueError::SourceNotFound(format!("UID '{}'", uid)))?,
        };
        let src_uid = items[src_index].uid().map(str::to_string);

        // Validate the destination and detect no-op moves before mutating.
        let dest_self = match &dest {
            MoveDest::Pos(pos) => {
                let dest_index = read_index(*pos, len)
                    .map_err(|_| QueueError::DestinationNotFound(format!("position {}", pos)))?;
                dest_index == src_index
            }
            MoveDest::Before(uid) | MoveDest::After(uid) => {
                if find_index(&items, uid).is_none() {
                    return Err(QueueError::DestinationNotFound(format!("UID '{}'", uid)));
                }
                src_uid.as_deref() == Some(uid.as_str())
            }
        };
        if dest_self {
            return Ok((items[src_index].clone(), len));
        }

        let mut remaining = items.clone();
        let moved = remaining.remove(src_index);
        let insert_at = match &dest {
            MoveDest::Pos(pos) => match read_index(*pos, len) {
                Ok(index) => index.min(remaining.len()),
                Err(_) => 0, // unreachable, validated above
            },
            MoveDest::Before(uid) => find_index(&remaining, uid).unwrap_or(0),
            MoveDest::After(uid) => {
                find_index(&remaining, uid).map(|i| i + 1).unwrap_or(remaining.len())
            }
        };

        self.store.list_remove(QUEUE_KEY, src_index).await?;
        self.store.list_insert(QUEUE_KEY, insert_at, serde_json::to_string(&moved)?).await?;
        self.bump_queue_tag();
        Ok((moved, len))
    }

    /// Remove and return an item. Defaults to the back of the queue.
    pub async fn pop_item(&mut self, item_ref: ItemRef) -> Result<(Item, usize), QueueError> {
        let items = self.read_queue().await?;
        let len = items.len();
        let index = match &item_ref {
            ItemRef::Pos(pos) => read_index(*pos, len)?,
            ItemRef::Uid(uid) => {
                if self.running_uid().await?.as_deref() == Some(uid.as_str()) {
                    return Err(QueueError::RemoveRunning);
                }
                find_index(&items, uid).ok_or_else(|| QueueError::UidNotFound(uid.clone()))?
            }
        };

        self.store.list_remove(QUEUE_KEY, index).await?;
        let item = items[index].clone();
        if let Some(uid) = item.uid() {
            self.uid_index.remove(uid);
        }
        self.bump_queue_tag();
        Ok((item, len - 1))
    }

    /// Return an item without removing it. The running item is not
    /// addressable here.
    pub async fn get_item(&self, item_ref: ItemRef) -> Result<Item, QueueError> {
        match item_ref {
            ItemRef::Pos(pos) => {
                let items = self.read_queue().await?;
                let index = read_index(pos, items.len())?;
                Ok(items[index].clone())
            }
            ItemRef::Uid(uid) => {
                if self.running_uid().await?.as_deref() == Some(uid.as_str()) {
                    return Err(QueueError::CurrentlyRunning(uid));
                }
                self.uid_index.get(&uid).cloned().ok_or(QueueError::UidNotFound(uid))
            }
        }
    }

    /// Empty the queue. The running slot and the history are untouched.
    pub async fn clear_queue(&mut self) -> Result<(), QueueError> {
        let items = self.read_queue().await?;
        if items.is_empty() {
            return Ok(());
        }
        for item in &items {
            if let Some(uid) = item.uid() {
                self.uid_index.remove(uid);
            }
        }
        self.store.list_clear(QUEUE_KEY).await?;
        self.bump_queue_tag();
        Ok(())
    }

    pub async fn clear_history(&mut self) -> Result<(), QueueError> {
        if self.get_history_size().await? == 0 {
            return Ok(());
        }
        self.store.list_clear(HISTORY_KEY).await?;
        self.bump_history_tag();
        Ok(())
    }

    /// Pop the front of the queue into the running slot. Returns `None`
    /// without any state change when the queue is empty or an item is
    /// already running.
    pub async fn set_next_item_as_running(&mut self) -> Result<Option<Item>, QueueError> {
        if self.is_item_running().await? {
            return Ok(None);
        }
        let Some(entry) = self.store.list_pop_front(QUEUE_KEY).await? else {
            return Ok(None);
        };
        let item: Item = serde_json::from_str(&entry)?;
        self.store.value_set(RUNNING_KEY, entry).await?;
        self.bump_queue_tag();
        Ok(Some(item))
    }

    /// Move the running item to history with the given result. No-op when
    /// nothing is running.
    pub async fn set_processed_item_as_completed(
        &mut self,
        exit_status: ExitStatus,
        run_uids: Vec<String>,
    ) -> Result<Option<Item>, QueueError> {
        let Some(item) = self.running_item().await? else {
            return Ok(None);
        };
        let done = item.with_result(exit_status, run_uids);
        self.store.list_push_back(HISTORY_KEY, serde_json::to_string(&done)?).await?;
        self.store.value_clear(RUNNING_KEY).await?;
        if let Some(uid) = item.uid() {
            self.uid_index.remove(uid);
        }
        self.bump_queue_tag();
        self.bump_history_tag();
        Ok(Some(done))
    }

    /// Like [`Self::set_processed_item_as_completed`], but additionally
    /// re-inserts the item at the front of the queue so that resuming the
    /// queue re-attempts it.
    ///
    /// The requeued copy is the item exactly as it entered the running
    /// slot (same UID, no `result`); mutations the plan may have seen
    /// during execution are not reflected.
    pub async fn set_processed_item_as_stopped(
        &mut self,
        exit_status: ExitStatus,
        run_uids: Vec<String>,
    ) -> Result<Option<Item>, QueueError> {
        let Some(item) = self.running_item().await? else {
            return Ok(None);
        };
        let done = item.with_result(exit_status, run_uids);
        self.store.list_push_back(HISTORY_KEY, serde_json::to_string(&done)?).await?;
        self.store.value_clear(RUNNING_KEY).await?;
        self.store.list_push_front(QUEUE_KEY, serde_json::to_string(&item)?).await?;
        // UID stays in the index, mapped to the requeued copy
        if let Some(uid) = item.uid() {
            self.uid_index.insert(uid.to_string(), item.clone());
        }
        self.bump_queue_tag();
        self.bump_history_tag();
        Ok(Some(done))
    }

    /// Wipe every pool entry owned by the queue service. Test hook.
    pub async fn delete_pool_entries(&mut self) -> Result<(), QueueError> {
        self.store.list_clear(QUEUE_KEY).await?;
        self.store.list_clear(HISTORY_KEY).await?;
        self.store.value_clear(RUNNING_KEY).await?;
        self.uid_index.clear();
        self.bump_queue_tag();
        self.bump_history_tag();
        Ok(())
    }
}

fn find_index(items: &[Item], uid: &str) -> Option<usize> {
    items.iter().position(|item| item.uid() == Some(uid))
}

/// Clamp an insertion position into `[0, len]`.
fn insert_index(pos: QueuePos, len: usize) -> usize {
    match pos {
        QueuePos::Front => 0,
        QueuePos::Back => len,
        QueuePos::Index(i) if i >= 0 => usize::try_from(i).map_or(len, |v| v.min(len)),
        QueuePos::Index(i) => {
            len.saturating_sub(usize::try_from(i.unsigned_abs()).unwrap_or(usize::MAX))
        }
    }
}

/// Resolve a position against an existing item; out of range is an error.
fn read_index(pos: QueuePos, len: usize) -> Result<usize, QueueError> {
    match pos {
        QueuePos::Front | QueuePos::Back if len == 0 => Err(QueueError::QueueEmpty),
        QueuePos::Front => Ok(0),
        QueuePos::Back => Ok(len - 1),
        QueuePos::Index(i) => {
            let index = if i >= 0 {
                usize::try_from(i).ok().filter(|v| *v < len)
            } else {
                len.checked_sub(usize::try_from(i.unsigned_abs()).unwrap_or(usize::MAX))
            };
            index.ok_or(QueueError::OutOfRange(i))
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
