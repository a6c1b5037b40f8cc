// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

const ALLOW_LISTS: &str = r#"
[groups.primary]
plans = ["count", "scan"]
devices = ["det1", "det2"]

[groups.primary.parameters.scan]
kwargs = ["detectors", "num", "delay"]

[groups.observers]
plans = ["count"]
"#;

fn perms() -> Permissions {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("allowed.toml");
    std::fs::write(&path, ALLOW_LISTS).unwrap();
    // Keep the tempdir alive for the lifetime of the test process
    std::mem::forget(dir);
    Permissions::load(path).unwrap()
}

fn item(item_type: ItemType, name: &str, user: &str, group: &str) -> Item {
    let mut item = Item::new(item_type, name);
    item.user = Some(user.to_string());
    item.user_group = Some(group.to_string());
    item
}

#[parameterized(
    count_primary = { "count", "primary", true },
    scan_primary = { "scan", "primary", true },
    count_observers = { "count", "observers", true },
    scan_observers = { "scan", "observers", false },
    unknown_plan = { "tune", "primary", false },
)]
fn plan_allow_list(name: &str, group: &str, allowed: bool) {
    let perms = perms();
    let result = perms.validate_item(&item(ItemType::Plan, name, "user1", group));
    assert_eq!(result.is_ok(), allowed, "plan {} group {}", name, group);
}

#[test]
fn unknown_group_is_rejected() {
    let perms = perms();
    let err = perms
        .validate_item(&item(ItemType::Plan, "count", "user1", "strangers"))
        .unwrap_err();
    assert_eq!(err, ValidationError::UnknownGroup("strangers".into()));
}

#[test]
fn missing_user_and_group_are_rejected() {
    let perms = perms();

    let mut no_user = Item::plan("count");
    no_user.user_group = Some("primary".into());
    assert_eq!(perms.validate_item(&no_user).unwrap_err(), ValidationError::MissingUser);

    let mut no_group = Item::plan("count");
    no_group.user = Some("user1".into());
    assert_eq!(perms.validate_item(&no_group).unwrap_err(), ValidationError::MissingUserGroup);
}

#[test]
fn declared_kwargs_are_enforced() {
    let perms = perms();

    let mut scan = item(ItemType::Plan, "scan", "user1", "primary");
    scan.kwargs.insert("num".into(), json!(5));
    scan.kwargs.insert("delay".into(), json!(0.5));
    assert!(perms.validate_item(&scan).is_ok());

    scan.kwargs.insert("bogus".into(), json!(1));
    let err = perms.validate_item(&scan).unwrap_err();
    assert_eq!(err, ValidationError::UnexpectedKwarg("bogus".into(), "scan".into()));

    // "count" declares no parameters, so any kwargs pass
    let mut count = item(ItemType::Plan, "count", "user1", "primary");
    count.kwargs.insert("anything".into(), json!(1));
    assert!(perms.validate_item(&count).is_ok());
}

#[test]
fn queue_stop_is_the_only_instruction() {
    let perms = perms();
    assert!(perms
        .validate_item(&item(ItemType::Instruction, "queue_stop", "user1", "primary"))
        .is_ok());

    let err = perms
        .validate_item(&item(ItemType::Instruction, "queue_halt", "user1", "primary"))
        .unwrap_err();
    assert_eq!(err, ValidationError::UnknownInstruction("queue_halt".into()));
}

#[test]
fn plans_allowed_lists_templates_with_kwargs() {
    let perms = perms();
    let plans = perms.plans_allowed("primary").unwrap();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans["count"], json!({"name": "count"}));
    assert_eq!(
        plans["scan"],
        json!({"name": "scan", "kwargs": ["detectors", "num", "delay"]})
    );

    let devices = perms.devices_allowed("primary").unwrap();
    assert_eq!(devices.len(), 2);
    assert!(devices.contains_key("det1"));

    assert!(perms.plans_allowed("strangers").is_err());
}

#[test]
fn reload_picks_up_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("allowed.toml");
    std::fs::write(&path, "[groups.primary]\nplans = [\"count\"]\n").unwrap();
    let perms = Permissions::load(&path).unwrap();
    assert!(perms.validate_item(&item(ItemType::Plan, "scan", "u", "primary")).is_err());

    std::fs::write(&path, "[groups.primary]\nplans = [\"count\", \"scan\"]\n").unwrap();
    perms.reload().unwrap();
    assert!(perms.validate_item(&item(ItemType::Plan, "scan", "u", "primary")).is_ok());
}

#[test]
fn permissive_mode_allows_any_plan() {
    let perms = Permissions::permissive();
    assert!(perms.validate_item(&item(ItemType::Plan, "whatever", "u", "any")).is_ok());
    // Identity is still required
    assert!(perms.validate_item(&Item::plan("whatever")).is_err());
    // Unknown instructions are still rejected
    assert!(perms
        .validate_item(&item(ItemType::Instruction, "nope", "u", "any"))
        .is_err());
}

#[test]
fn malformed_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("allowed.toml");
    std::fs::write(&path, "not [valid toml").unwrap();
    assert!(matches!(Permissions::load(&path), Err(PermissionsError::Parse(_))));
}
