// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample_runs() -> Vec<RunEntry> {
    vec![
        RunEntry { uid: "r1".into(), is_open: false, exit_status: Some("success".into()) },
        RunEntry { uid: "r2".into(), is_open: true, exit_status: None },
        RunEntry { uid: "r3".into(), is_open: true, exit_status: None },
    ]
}

#[test]
fn all_and_active_return_full_list() {
    let runs = sample_runs();
    assert_eq!(RunFilter::All.apply(&runs), runs);
    assert_eq!(RunFilter::Active.apply(&runs), runs);
}

#[test]
fn open_and_closed_split_the_list() {
    let runs = sample_runs();
    let open = RunFilter::Open.apply(&runs);
    assert_eq!(open.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["r2", "r3"]);
    let closed = RunFilter::Closed.apply(&runs);
    assert_eq!(closed.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["r1"]);
}

#[test]
fn filter_parses_from_wire_names() {
    for (name, expected) in [
        ("all", RunFilter::All),
        ("active", RunFilter::Active),
        ("open", RunFilter::Open),
        ("closed", RunFilter::Closed),
    ] {
        let parsed: RunFilter = serde_json::from_value(serde_json::json!(name)).unwrap();
        assert_eq!(parsed, expected);
    }
}
