// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::MemoryStore;
use runq_core::ItemType;

fn plan(name: &str) -> Item {
    Item::plan(name)
}

fn plan_uid(uid: &str, name: &str) -> Item {
    let mut item = Item::plan(name);
    item.item_uid = Some(uid.to_string());
    item
}

fn pq() -> PlanQueue {
    PlanQueue::new(Arc::new(MemoryStore::new()))
}

async fn names(pq: &PlanQueue) -> String {
    let (items, _) = pq.get_queue().await.unwrap();
    items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join("")
}

// ── Running slot basics ──────────────────────────────────────────────────────

#[tokio::test]
async fn running_item_info_empty() {
    let pq = pq();
    assert!(pq.get_running_item_info().await.unwrap().is_none());
    assert!(!pq.is_item_running().await.unwrap());
}

#[tokio::test]
async fn delete_pool_entries_wipes_everything() {
    let mut pq = pq();
    pq.add_item_to_queue(plan("a"), None).await.unwrap();
    pq.set_next_item_as_running().await.unwrap();
    pq.add_item_to_queue(plan("b"), None).await.unwrap();

    pq.delete_pool_entries().await.unwrap();
    assert_eq!(pq.get_queue_size().await.unwrap(), 0);
    assert_eq!(pq.get_history_size().await.unwrap(), 0);
    assert!(!pq.is_item_running().await.unwrap());
    assert_eq!(pq.uid_count(), 0);
}

#[tokio::test]
async fn new_item_uid_mints_fresh_values() {
    let pq = pq();
    let a = pq.new_item_uid();
    let b = pq.new_item_uid();
    assert_ne!(a, b);

    let item = plan_uid("old", "a");
    let rekeyed = pq.set_new_item_uid(&item);
    assert_ne!(rekeyed.uid(), item.uid());
    assert_eq!(rekeyed.name, item.name);
}

// ── Queue clean on startup ───────────────────────────────────────────────────

#[tokio::test]
async fn start_drops_malformed_queue_entries() {
    let store = Arc::new(MemoryStore::new());
    store.list_push_back(QUEUE_KEY, "{\"testing\": 2}".into()).await.unwrap();
    store
        .list_push_back(QUEUE_KEY, serde_json::to_string(&plan_uid("ab", "nm")).unwrap())
        .await
        .unwrap();
    // Valid shape but no UID
    store
        .list_push_back(QUEUE_KEY, serde_json::to_string(&plan("no_uid")).unwrap())
        .await
        .unwrap();

    let mut pq = PlanQueue::new(store);
    pq.start().await.unwrap();

    let (items, _) = pq.get_queue().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uid(), Some("ab"));
    assert_eq!(pq.uid_count(), 1);
}

#[tokio::test]
async fn start_clears_invalid_running_payload() {
    let store = Arc::new(MemoryStore::new());
    store.value_set(RUNNING_KEY, "{\"testing\": 1}".into()).await.unwrap();

    let mut pq = PlanQueue::new(store);
    pq.start().await.unwrap();
    assert!(!pq.is_item_running().await.unwrap());
}

#[tokio::test]
async fn start_keeps_valid_running_payload() {
    let store = Arc::new(MemoryStore::new());
    store
        .value_set(RUNNING_KEY, serde_json::to_string(&plan_uid("a", "nm")).unwrap())
        .await
        .unwrap();

    let mut pq = PlanQueue::new(store);
    pq.start().await.unwrap();
    assert!(pq.is_item_running().await.unwrap());
    assert_eq!(pq.uid_count(), 1);
}

// ── Inserting ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_item_position_composition() {
    let mut pq = pq();
    let cases: [(&str, Option<QueuePlace>); 12] = [
        ("a", None),
        ("b", None),
        ("c", Some(QueuePlace::Pos(QueuePos::Back))),
        ("d", Some(QueuePlace::Pos(QueuePos::Front))),
        ("e", Some(QueuePlace::Pos(QueuePos::Index(0)))),
        ("f", Some(QueuePlace::Pos(QueuePos::Index(5)))),
        ("g", Some(QueuePlace::Pos(QueuePos::Index(5)))),
        ("h", Some(QueuePlace::Pos(QueuePos::Index(-1)))),
        ("i", Some(QueuePlace::Pos(QueuePos::Index(3)))),
        ("j", Some(QueuePlace::Pos(QueuePos::Index(100)))),
        ("k", Some(QueuePlace::Pos(QueuePos::Index(-10)))),
        ("l", Some(QueuePlace::Pos(QueuePos::Index(-100)))),
    ];
    for (n, (name, place)) in cases.into_iter().enumerate() {
        let (stored, qsize) = pq.add_item_to_queue(plan(name), place).await.unwrap();
        assert_eq!(stored.name, name);
        assert_eq!(qsize, n + 1);
    }

    assert_eq!(pq.get_queue_size().await.unwrap(), 12);
    assert_eq!(names(&pq).await, "lkedaibcghfj");
}

#[tokio::test]
async fn add_item_stamps_missing_uid() {
    let mut pq = pq();
    let (stored, _) = pq.add_item_to_queue(plan("a"), None).await.unwrap();
    assert!(stored.uid().unwrap().starts_with("item-"));
}

#[tokio::test]
async fn add_item_before_and_after_uid() {
    let mut pq = pq();
    for name in ["a", "b", "c"] {
        pq.add_item_to_queue(plan(name), None).await.unwrap();
    }
    let (queue, _) = pq.get_queue().await.unwrap();
    let pivot = queue[1].uid().unwrap().to_string();

    pq.add_item_to_queue(plan("d"), Some(QueuePlace::Before(pivot.clone()))).await.unwrap();
    pq.add_item_to_queue(plan("e"), Some(QueuePlace::After(pivot))).await.unwrap();
    assert_eq!(names(&pq).await, "adbec");
}

#[tokio::test]
async fn add_item_relative_to_running_item() {
    let mut pq = pq();
    for name in ["a", "b", "c"] {
        pq.add_item_to_queue(plan(name), None).await.unwrap();
    }
    let running = pq.set_next_item_as_running().await.unwrap().unwrap();
    let running_uid = running.uid().unwrap().to_string();

    // After the running item means the front of the queue
    let (_, qsize) =
        pq.add_item_to_queue(plan("f"), Some(QueuePlace::After(running_uid.clone()))).await.unwrap();
    assert_eq!(qsize, 3);
    assert_eq!(names(&pq).await, "fbc");

    let tag = pq.plan_queue_uid().to_string();
    let err = pq
        .add_item_to_queue(plan("g"), Some(QueuePlace::Before(running_uid)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InsertBeforeRunning));
    assert_eq!(pq.plan_queue_uid(), tag);

    let err = pq
        .add_item_to_queue(plan("h"), Some(QueuePlace::Before("nonexistent".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::UidNotFound(_)));
    assert_eq!(names(&pq).await, "fbc");
}

#[tokio::test]
async fn add_item_rejects_duplicate_uid() {
    let mut pq = pq();
    pq.add_item_to_queue(plan_uid("abc", "a"), None).await.unwrap();
    let tag = pq.plan_queue_uid().to_string();

    let err = pq.add_item_to_queue(plan_uid("abc", "a"), None).await.unwrap_err();
    assert!(matches!(err, QueueError::UidCollision(_)));
    assert_eq!(pq.plan_queue_uid(), tag);
    assert_eq!(pq.get_queue_size().await.unwrap(), 1);
}

#[tokio::test]
async fn place_from_parts_rejects_conflicts() {
    let err = QueuePlace::from_parts(
        Some(QueuePos::Index(5)),
        Some("abc".into()),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueueError::Ambiguous(_)));

    let err = QueuePlace::from_parts(None, Some("abc".into()), Some("abc".into())).unwrap_err();
    assert!(matches!(err, QueueError::Ambiguous(_)));

    assert_eq!(QueuePlace::from_parts(None, None, None).unwrap(), None);
}

// ── Batch insert ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_add_is_all_or_nothing() {
    let mut pq = pq();
    pq.add_item_to_queue(plan_uid("existing", "x"), None).await.unwrap();
    let tag = pq.plan_queue_uid().to_string();

    let outcome = pq
        .add_batch_to_queue(vec![plan("a"), plan_uid("existing", "b"), plan("c")])
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.qsize, 1);
    assert_eq!(
        outcome.results.iter().map(|r| r.success).collect::<Vec<_>>(),
        [true, false, true]
    );
    assert!(outcome.results[1].msg.contains("already in the queue"));
    assert_eq!(pq.get_queue_size().await.unwrap(), 1);
    assert_eq!(pq.plan_queue_uid(), tag);
}

#[tokio::test]
async fn batch_add_rejects_duplicates_within_batch() {
    let mut pq = pq();
    let outcome = pq
        .add_batch_to_queue(vec![plan_uid("dup", "a"), plan_uid("dup", "b")])
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(pq.get_queue_size().await.unwrap(), 0);
}

#[tokio::test]
async fn batch_add_inserts_in_order() {
    let mut pq = pq();
    let outcome = pq
        .add_batch_to_queue(vec![plan("a"), plan("b"), plan("c")])
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.qsize, 3);
    assert!(outcome.items.iter().all(|i| i.uid().is_some()));
    assert_eq!(names(&pq).await, "abc");
}

// ── Get ──────────────────────────────────────────────────────────────────────

async fn three_item_queue() -> PlanQueue {
    let mut pq = pq();
    pq.add_item_to_queue(plan_uid("one", "a"), None).await.unwrap();
    pq.add_item_to_queue(plan_uid("two", "b"), None).await.unwrap();
    pq.add_item_to_queue(plan_uid("three", "c"), None).await.unwrap();
    pq
}

#[tokio::test]
async fn get_item_by_position_and_uid() {
    let pq = three_item_queue().await;
    let cases: [(ItemRef, &str); 10] = [
        (ItemRef::Pos(QueuePos::Front), "a"),
        (ItemRef::Pos(QueuePos::Back), "c"),
        (ItemRef::Pos(QueuePos::Index(0)), "a"),
        (ItemRef::Pos(QueuePos::Index(1)), "b"),
        (ItemRef::Pos(QueuePos::Index(2)), "c"),
        (ItemRef::Pos(QueuePos::Index(-1)), "c"),
        (ItemRef::Pos(QueuePos::Index(-2)), "b"),
        (ItemRef::Pos(QueuePos::Index(-3)), "a"),
        (ItemRef::Uid("one".into()), "a"),
        (ItemRef::Uid("two".into()), "b"),
    ];
    for (item_ref, name) in cases {
        assert_eq!(pq.get_item(item_ref).await.unwrap().name, name);
    }

    for bad in [QueuePos::Index(3), QueuePos::Index(-4)] {
        let err = pq.get_item(ItemRef::Pos(bad)).await.unwrap_err();
        assert!(matches!(err, QueueError::OutOfRange(_)));
    }
    let err = pq.get_item(ItemRef::Uid("nonexistent".into())).await.unwrap_err();
    assert!(matches!(err, QueueError::UidNotFound(_)));
}

#[tokio::test]
async fn get_item_refuses_running_item() {
    let mut pq = three_item_queue().await;
    pq.set_next_item_as_running().await.unwrap();

    let err = pq.get_item(ItemRef::Uid("one".into())).await.unwrap_err();
    assert!(matches!(err, QueueError::CurrentlyRunning(_)));

    let err = ItemRef::from_parts(Some(QueuePos::Index(5)), Some("abc".into())).unwrap_err();
    assert!(matches!(err, QueueError::Ambiguous(_)));
}

#[tokio::test]
async fn get_queue_full_reports_running_item() {
    let mut pq = three_item_queue().await;
    pq.set_next_item_as_running().await.unwrap();

    let tag = pq.plan_queue_uid().to_string();
    let (queue, running, queue_tag) = pq.get_queue_full().await.unwrap();
    assert_eq!(queue.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), ["b", "c"]);
    assert_eq!(running.unwrap().name, "a");
    assert_eq!(queue_tag, tag);

    // Reading does not advance the tag
    let (_, queue_tag_2) = pq.get_queue().await.unwrap();
    assert_eq!(queue_tag_2, tag);
}

// ── Replace ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_item_keeps_or_replaces_uid() {
    for replace_uid in [false, true] {
        let mut pq = three_item_queue().await;
        let target = pq.get_item(ItemRef::Pos(QueuePos::Index(1))).await.unwrap();
        let target_uid = target.uid().unwrap().to_string();

        let mut new_item = plan("e");
        new_item.item_uid = if replace_uid {
            Some(pq.new_item_uid())
        } else {
            Some(target_uid.clone())
        };

        let tag = pq.plan_queue_uid().to_string();
        let (stored, qsize) = pq.replace_item(new_item.clone(), &target_uid).await.unwrap();
        assert_eq!(stored.name, "e");
        assert_eq!(stored.item_uid, new_item.item_uid);
        assert_eq!(qsize, 3);
        assert_ne!(pq.plan_queue_uid(), tag);

        let fetched =
            pq.get_item(ItemRef::Uid(stored.uid().unwrap().to_string())).await.unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(pq.get_queue_size().await.unwrap(), 3);
    }
}

#[tokio::test]
async fn replace_item_without_uid_mints_one() {
    let mut pq = three_item_queue().await;
    let (stored, _) = pq.replace_item(plan("h"), "two").await.unwrap();
    let new_uid = stored.uid().unwrap().to_string();
    assert_ne!(new_uid, "two");

    // Rebuilding the index still resolves the new UID
    pq.start().await.unwrap();
    assert_eq!(pq.get_item(ItemRef::Uid(new_uid)).await.unwrap().name, "h");
    assert!(matches!(
        pq.get_item(ItemRef::Uid("two".into())).await.unwrap_err(),
        QueueError::UidNotFound(_)
    ));
}

#[tokio::test]
async fn replace_item_failure_modes() {
    let mut pq = three_item_queue().await;
    let running = pq.set_next_item_as_running().await.unwrap().unwrap();
    let running_uid = running.uid().unwrap().to_string();
    let tag = pq.plan_queue_uid().to_string();

    // Target is the running item
    let err = pq.replace_item(plan("h"), &running_uid).await.unwrap_err();
    assert!(matches!(err, QueueError::CurrentlyRunning(_)));
    assert_eq!(pq.plan_queue_uid(), tag);

    // Target is not in the queue
    let err = pq.replace_item(plan("h"), "uid-that-does-not-exist").await.unwrap_err();
    assert!(matches!(err, QueueError::UidNotFound(_)));
    assert_eq!(pq.plan_queue_uid(), tag);

    // New item collides with another queue item
    let err = pq.replace_item(plan_uid("two", "h"), "three").await.unwrap_err();
    assert!(matches!(err, QueueError::UidCollision(_)));
    assert_eq!(pq.plan_queue_uid(), tag);

    // New item collides with the running item
    let err = pq.replace_item(plan_uid(&running_uid, "h"), "three").await.unwrap_err();
    assert!(matches!(err, QueueError::UidCollision(_)));
    assert_eq!(pq.plan_queue_uid(), tag);

    assert_eq!(names(&pq).await, "bc");
}

// ── Move ─────────────────────────────────────────────────────────────────────

async fn five_item_queue() -> PlanQueue {
    let mut pq = pq();
    for (uid, name) in [("p1", "a"), ("p2", "b"), ("p3", "c"), ("p4", "d"), ("p5", "e")] {
        pq.add_item_to_queue(plan_uid(uid, name), None).await.unwrap();
    }
    pq
}

async fn check_move(src: ItemRef, dest: MoveDest, moved: &str, order: &str, tag_changes: bool) {
    let mut pq = five_item_queue().await;
    let tag = pq.plan_queue_uid().to_string();

    let (item, qsize) = pq.move_item(src.clone(), dest.clone()).await.unwrap();
    assert_eq!(item.name, moved, "src: {:?}, dest: {:?}", src, dest);
    assert_eq!(qsize, 5);
    assert_eq!(names(&pq).await, order, "src: {:?}, dest: {:?}", src, dest);
    if tag_changes {
        assert_ne!(pq.plan_queue_uid(), tag, "src: {:?}, dest: {:?}", src, dest);
    } else {
        assert_eq!(pq.plan_queue_uid(), tag, "src: {:?}, dest: {:?}", src, dest);
    }
}

#[tokio::test]
async fn move_item_by_positions() {
    use ItemRef::Pos as Src;
    use MoveDest::Pos as Dst;
    use QueuePos::{Back, Front, Index};

    check_move(Src(Index(1)), Dst(Index(1)), "b", "abcde", false).await;
    check_move(Src(Front), Dst(Front), "a", "abcde", false).await;
    check_move(Src(Back), Dst(Back), "e", "abcde", false).await;
    check_move(Src(Front), Dst(Back), "a", "bcdea", true).await;
    check_move(Src(Back), Dst(Front), "e", "eabcd", true).await;
    check_move(Src(Index(1)), Dst(Index(2)), "b", "acbde", true).await;
    check_move(Src(Index(2)), Dst(Index(1)), "c", "acbde", true).await;
    check_move(Src(Index(0)), Dst(Index(4)), "a", "bcdea", true).await;
    check_move(Src(Index(4)), Dst(Index(0)), "e", "eabcd", true).await;
    check_move(Src(Index(3)), Dst(Front), "d", "dabce", true).await;
    check_move(Src(Index(2)), Dst(Back), "c", "abdec", true).await;
}

#[tokio::test]
async fn move_item_by_uids() {
    check_move(ItemRef::Uid("p3".into()), MoveDest::After("p3".into()), "c", "abcde", false).await;
    check_move(ItemRef::Uid("p1".into()), MoveDest::Before("p2".into()), "a", "abcde", true).await;
    check_move(ItemRef::Uid("p1".into()), MoveDest::After("p2".into()), "a", "bacde", true).await;
    check_move(ItemRef::Uid("p2".into()), MoveDest::Pos(QueuePos::Front), "b", "bacde", true)
        .await;
    check_move(ItemRef::Uid("p2".into()), MoveDest::Pos(QueuePos::Back), "b", "acdeb", true)
        .await;
    check_move(ItemRef::Uid("p1".into()), MoveDest::Pos(QueuePos::Front), "a", "abcde", false)
        .await;
    check_move(ItemRef::Uid("p5".into()), MoveDest::Pos(QueuePos::Back), "e", "abcde", false)
        .await;
}

#[tokio::test]
async fn move_item_mixed_locators() {
    use QueuePos::{Back, Front, Index};

    check_move(ItemRef::Pos(Index(1)), MoveDest::After("p4".into()), "b", "acdbe", true).await;
    check_move(ItemRef::Pos(Front), MoveDest::After("p4".into()), "a", "bcdae", true).await;
    check_move(ItemRef::Pos(Index(3)), MoveDest::After("p1".into()), "d", "adbce", true).await;
    check_move(ItemRef::Pos(Back), MoveDest::After("p1".into()), "e", "aebcd", true).await;
    check_move(ItemRef::Pos(Index(1)), MoveDest::Before("p4".into()), "b", "acbde", true).await;
    check_move(ItemRef::Pos(Front), MoveDest::Before("p4".into()), "a", "bcade", true).await;
    check_move(ItemRef::Pos(Index(3)), MoveDest::Before("p1".into()), "d", "dabce", true).await;
    check_move(ItemRef::Pos(Back), MoveDest::Before("p1".into()), "e", "eabcd", true).await;
    check_move(ItemRef::Pos(Back), MoveDest::After("p5".into()), "e", "abcde", false).await;
    check_move(ItemRef::Pos(Front), MoveDest::Before("p1".into()), "a", "abcde", false).await;
}

#[tokio::test]
async fn move_item_failure_modes() {
    let mut pq = five_item_queue().await;
    let tag = pq.plan_queue_uid().to_string();

    let err = pq
        .move_item(ItemRef::Pos(QueuePos::Index(50)), MoveDest::Before("p1".into()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "source plan (position 50) was not found");

    let err = pq
        .move_item(ItemRef::Uid("abc".into()), MoveDest::Before("p1".into()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "source plan (UID 'abc') was not found");

    let err = pq
        .move_item(ItemRef::Pos(QueuePos::Index(3)), MoveDest::Pos(QueuePos::Index(50)))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "destination plan (position 50) was not found");

    let err = pq
        .move_item(ItemRef::Uid("p1".into()), MoveDest::Before("abc".into()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "destination plan (UID 'abc') was not found");

    let err = MoveDest::from_parts(
        Some(QueuePos::Index(4)),
        Some("p4".into()),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueueError::Ambiguous(_)));

    assert_eq!(pq.plan_queue_uid(), tag);
    assert_eq!(names(&pq).await, "abcde");
}

// ── Pop ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pop_item_by_position() {
    let cases: [(QueuePos, Option<&str>); 10] = [
        (QueuePos::Front, Some("a")),
        (QueuePos::Back, Some("c")),
        (QueuePos::Index(0), Some("a")),
        (QueuePos::Index(1), Some("b")),
        (QueuePos::Index(2), Some("c")),
        (QueuePos::Index(3), None),
        (QueuePos::Index(-1), Some("c")),
        (QueuePos::Index(-2), Some("b")),
        (QueuePos::Index(-3), Some("a")),
        (QueuePos::Index(-4), None),
    ];
    for (pos, expected) in cases {
        let mut pq = three_item_queue().await;
        let tag = pq.plan_queue_uid().to_string();
        match expected {
            Some(name) => {
                let (item, qsize) = pq.pop_item(ItemRef::Pos(pos)).await.unwrap();
                assert_eq!(item.name, name);
                assert_eq!(qsize, 2);
                assert_ne!(pq.plan_queue_uid(), tag);
                // The UID is free again, so the item can be re-added
                pq.add_item_to_queue(item, None).await.unwrap();
                assert_eq!(pq.get_queue_size().await.unwrap(), 3);
            }
            None => {
                let err = pq.pop_item(ItemRef::Pos(pos)).await.unwrap_err();
                assert!(matches!(err, QueueError::OutOfRange(_)));
                assert_eq!(pq.plan_queue_uid(), tag);
            }
        }
    }
}

#[tokio::test]
async fn pop_item_from_empty_queue() {
    for pos in [QueuePos::Front, QueuePos::Back, QueuePos::Index(0), QueuePos::Index(-1)] {
        let mut pq = pq();
        let tag = pq.plan_queue_uid().to_string();
        let err = pq.pop_item(ItemRef::Pos(pos)).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueEmpty | QueueError::OutOfRange(_)));
        assert_eq!(pq.plan_queue_uid(), tag);
    }
}

#[tokio::test]
async fn pop_item_by_uid() {
    let mut pq = three_item_queue().await;

    pq.pop_item(ItemRef::Uid("two".into())).await.unwrap();
    assert_eq!(pq.get_queue_size().await.unwrap(), 2);

    let tag = pq.plan_queue_uid().to_string();
    let err = pq.pop_item(ItemRef::Uid("two".into())).await.unwrap_err();
    assert!(matches!(err, QueueError::UidNotFound(_)));
    assert_eq!(pq.plan_queue_uid(), tag);

    pq.set_next_item_as_running().await.unwrap();
    let tag = pq.plan_queue_uid().to_string();
    let err = pq.pop_item(ItemRef::Uid("one".into())).await.unwrap_err();
    assert!(matches!(err, QueueError::RemoveRunning));
    assert_eq!(pq.plan_queue_uid(), tag);
    assert_eq!(pq.get_queue_size().await.unwrap(), 1);
}

// ── Clear ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn clear_queue_leaves_running_item() {
    let mut pq = three_item_queue().await;
    pq.set_next_item_as_running().await.unwrap();
    assert_eq!(pq.get_queue_size().await.unwrap(), 2);
    assert_eq!(pq.uid_count(), 3);

    let tag = pq.plan_queue_uid().to_string();
    pq.clear_queue().await.unwrap();
    assert_eq!(pq.get_queue_size().await.unwrap(), 0);
    assert_eq!(pq.uid_count(), 1);
    assert!(pq.is_item_running().await.unwrap());
    assert_ne!(pq.plan_queue_uid(), tag);
}

#[tokio::test]
async fn clear_of_empty_collections_keeps_tags() {
    let mut pq = pq();
    let queue_tag = pq.plan_queue_uid().to_string();
    let history_tag = pq.plan_history_uid().to_string();
    pq.clear_queue().await.unwrap();
    pq.clear_history().await.unwrap();
    assert_eq!(pq.plan_queue_uid(), queue_tag);
    assert_eq!(pq.plan_history_uid(), history_tag);
}

// ── Running-slot transitions ─────────────────────────────────────────────────

#[tokio::test]
async fn set_next_item_as_running_idempotence() {
    let mut pq = pq();

    // Empty queue: no item, no tag change
    let tag = pq.plan_queue_uid().to_string();
    assert!(pq.set_next_item_as_running().await.unwrap().is_none());
    assert_eq!(pq.plan_queue_uid(), tag);

    for name in ["a", "b", "c"] {
        pq.add_item_to_queue(plan(name), None).await.unwrap();
    }

    let tag = pq.plan_queue_uid().to_string();
    assert!(pq.set_next_item_as_running().await.unwrap().is_some());
    assert_ne!(pq.plan_queue_uid(), tag);
    assert_eq!(pq.get_queue_size().await.unwrap(), 2);
    assert_eq!(pq.uid_count(), 3);

    // Second call: an item is already running
    let tag = pq.plan_queue_uid().to_string();
    assert!(pq.set_next_item_as_running().await.unwrap().is_none());
    assert_eq!(pq.plan_queue_uid(), tag);
    assert_eq!(pq.get_queue_size().await.unwrap(), 2);
    assert_eq!(pq.uid_count(), 3);
}

#[tokio::test]
async fn completed_item_moves_to_history() {
    let mut pq = three_item_queue().await;

    // No item running: no-op, no tag changes
    let queue_tag = pq.plan_queue_uid().to_string();
    let history_tag = pq.plan_history_uid().to_string();
    let done = pq
        .set_processed_item_as_completed(ExitStatus::Completed, vec!["abc1".into()])
        .await
        .unwrap();
    assert!(done.is_none());
    assert_eq!(pq.plan_queue_uid(), queue_tag);
    assert_eq!(pq.plan_history_uid(), history_tag);

    pq.set_next_item_as_running().await.unwrap();
    let queue_tag = pq.plan_queue_uid().to_string();
    let done = pq
        .set_processed_item_as_completed(ExitStatus::Completed, vec!["abc1".into()])
        .await
        .unwrap()
        .unwrap();
    assert_ne!(pq.plan_queue_uid(), queue_tag);
    assert_ne!(pq.plan_history_uid(), history_tag);

    assert_eq!(pq.get_queue_size().await.unwrap(), 2);
    assert_eq!(pq.get_history_size().await.unwrap(), 1);
    assert_eq!(pq.uid_count(), 2);
    assert_eq!(done.name, "a");
    let result = done.result.clone().unwrap();
    assert_eq!(result.exit_status, ExitStatus::Completed);
    assert_eq!(result.run_uids, vec!["abc1".to_string()]);

    let (history, _) = pq.get_history().await.unwrap();
    assert_eq!(history, vec![done]);
    assert!(!pq.is_item_running().await.unwrap());
}

#[tokio::test]
async fn stopped_item_returns_to_queue_front() {
    let mut pq = three_item_queue().await;

    pq.set_next_item_as_running().await.unwrap();
    let done = pq
        .set_processed_item_as_stopped(ExitStatus::Stopped, vec!["r2".into(), "r3".into()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.name, "a");

    // Back at the front, history grew by one
    assert_eq!(pq.get_queue_size().await.unwrap(), 3);
    assert_eq!(pq.get_history_size().await.unwrap(), 1);
    assert_eq!(names(&pq).await, "abc");
    assert_eq!(pq.uid_count(), 3);

    // The requeued copy carries no result and keeps its UID
    let front = pq.get_item(ItemRef::Pos(QueuePos::Front)).await.unwrap();
    assert_eq!(front.uid(), Some("one"));
    assert!(front.result.is_none());

    // Re-running and stopping again records the same item again
    pq.set_next_item_as_running().await.unwrap();
    let done = pq
        .set_processed_item_as_stopped(ExitStatus::Stopped, vec![])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.name, "a");
    assert_eq!(pq.get_queue_size().await.unwrap(), 3);
    assert_eq!(pq.get_history_size().await.unwrap(), 2);

    let (history, _) = pq.get_history().await.unwrap();
    assert!(history.iter().all(|item| item.name == "a"));
}

// ── History ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_reads_do_not_advance_tag() {
    let mut pq = three_item_queue().await;
    pq.set_next_item_as_running().await.unwrap();
    pq.set_processed_item_as_completed(ExitStatus::Completed, vec![]).await.unwrap();

    let tag = pq.plan_history_uid().to_string();
    let (history, history_tag) = pq.get_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history_tag, tag);
    assert_eq!(pq.get_history_size().await.unwrap(), 1);

    pq.clear_history().await.unwrap();
    assert_ne!(pq.plan_history_uid(), tag);
    let (history, _) = pq.get_history().await.unwrap();
    assert!(history.is_empty());
}

// ── UID index invariant ──────────────────────────────────────────────────────

#[tokio::test]
async fn uid_index_matches_queue_and_running_slot() {
    let mut pq = three_item_queue().await;
    assert_eq!(pq.uid_count(), 3);

    pq.set_next_item_as_running().await.unwrap();
    assert_eq!(pq.uid_count(), 3);

    pq.pop_item(ItemRef::Uid("two".into())).await.unwrap();
    assert_eq!(pq.uid_count(), 2);

    pq.add_item_to_queue(plan("d"), None).await.unwrap();
    assert_eq!(pq.uid_count(), 3);

    pq.set_processed_item_as_completed(ExitStatus::Completed, vec![]).await.unwrap();
    assert_eq!(pq.uid_count(), 2);

    // Rebuild from the store and verify the index converges to the same set
    pq.start().await.unwrap();
    assert_eq!(pq.uid_count(), 2);
    let (queue, running, _) = pq.get_queue_full().await.unwrap();
    assert_eq!(queue.len(), 2);
    assert!(running.is_none());
}

#[tokio::test]
async fn instruction_items_are_ordinary_queue_entries() {
    let mut pq = pq();
    pq.add_item_to_queue(Item::instruction("queue_stop"), None).await.unwrap();
    pq.add_item_to_queue(plan("a"), None).await.unwrap();

    let front = pq.get_item(ItemRef::Pos(QueuePos::Front)).await.unwrap();
    assert_eq!(front.item_type, ItemType::Instruction);
    assert!(front.is_queue_stop());
    assert_eq!(pq.get_queue_size().await.unwrap(), 2);
}
