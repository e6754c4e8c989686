// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_hash_map_lookup() {
    let id = TestId::from_string("tst-abc");
    let mut map = HashMap::new();
    map.insert(id, 42);
    assert_eq!(map.get("tst-abc"), Some(&42));
}

#[test]
fn define_id_round_trips_through_display() {
    let id = TestId::new_random();
    let parsed = TestId::from_string(id.to_string());
    assert_eq!(id, parsed);
    assert!(id.as_str().starts_with("tst-"));
}

#[test]
fn define_id_new_random_is_unique() {
    assert_ne!(TestId::new_random(), TestId::new_random());
}

#[test]
fn short_fn_on_str() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
    assert_eq!(short(s, 100), s);
    assert_eq!(short("abc", 8), "abc");
}

#[test]
fn id_buf_basics() {
    let id = IdBuf::new("call-1");
    assert_eq!(id.as_str(), "call-1");
    assert!(!id.is_empty());
    assert!(IdBuf::empty().is_empty());
}

#[test]
fn call_id_gen_is_monotonic_and_unique() {
    let gen = CallIdGen::new();
    let ids: Vec<String> = (0..100).map(|_| gen.next()).collect();
    let mut seen = std::collections::HashSet::new();
    for id in &ids {
        assert!(seen.insert(id.clone()), "duplicate call-id: {id}");
    }
    assert_eq!(ids.len(), seen.len());
}
