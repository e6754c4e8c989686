// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn next_backoff_doubles_until_cap() {
    let cap = Duration::from_secs(30);
    let mut backoff = INITIAL_BACKOFF;
    for _ in 0..10 {
        backoff = next_backoff(backoff, cap);
        assert!(backoff <= cap);
    }
    assert_eq!(backoff, cap);
}

#[test]
fn next_backoff_never_exceeds_cap_from_the_first_step() {
    assert_eq!(next_backoff(Duration::from_secs(20), Duration::from_secs(30)), Duration::from_secs(30));
}

#[test]
fn exceeds_threshold_counts_only_failures_within_the_window() {
    let now = Instant::now();
    let window = Duration::from_secs(60);
    let failures = vec![
        now - Duration::from_secs(120),
        now - Duration::from_secs(90),
        now - Duration::from_secs(10),
        now - Duration::from_secs(5),
    ];
    assert!(!exceeds_threshold(&failures, now, window, 3));
    assert!(exceeds_threshold(&failures, now, window, 2));
}

#[test]
fn exceeds_threshold_is_false_with_no_failures() {
    assert!(!exceeds_threshold(&[], Instant::now(), Duration::from_secs(60), 1));
}
