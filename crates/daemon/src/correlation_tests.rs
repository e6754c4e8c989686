// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_core::{FakeClock, SessionId, WorkerId};
use std::time::Duration;

fn deadline(clock: &FakeClock, ms: u64) -> Instant {
    clock.now() + Duration::from_millis(ms)
}

#[tokio::test]
async fn resolve_delivers_outcome_to_waiter() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let rx = table
        .register("call-1", SessionId::new_random(), WorkerId::new_random(), deadline(&clock, 1000))
        .unwrap();
    assert!(table.resolve("call-1", serde_json::json!({"ok": true})));
    let outcome = rx.await.unwrap();
    assert_eq!(outcome.unwrap(), serde_json::json!({"ok": true}));
}

#[tokio::test]
async fn reject_delivers_error_kind() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let rx = table
        .register("call-1", SessionId::new_random(), WorkerId::new_random(), deadline(&clock, 1000))
        .unwrap();
    assert!(table.reject("call-1", ErrorKind::FunctionError));
    assert_eq!(rx.await.unwrap().unwrap_err().kind, ErrorKind::FunctionError);
}

#[test]
fn register_rejects_duplicate_id() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let session = SessionId::new_random();
    let worker = WorkerId::new_random();
    table.register("call-1", session, worker, deadline(&clock, 1000)).unwrap();
    let err = table.register("call-1", session, worker, deadline(&clock, 1000)).unwrap_err();
    assert!(matches!(err, CorrelationError::Duplicate(id) if id == "call-1"));
}

#[test]
fn resolve_is_idempotent() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    table.register("call-1", SessionId::new_random(), WorkerId::new_random(), deadline(&clock, 1000)).unwrap();
    assert!(table.resolve("call-1", serde_json::Value::Null));
    assert!(!table.resolve("call-1", serde_json::Value::Null));
    assert!(!table.reject("call-1", ErrorKind::Timeout));
}

#[tokio::test]
async fn sweep_expired_rejects_past_deadline_only() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let session = SessionId::new_random();
    let worker = WorkerId::new_random();
    let soon = table.register("call-soon", session, worker, deadline(&clock, 100)).unwrap();
    let later = table.register("call-later", session, worker, deadline(&clock, 10_000)).unwrap();

    clock.advance(Duration::from_millis(200));
    let expired = table.sweep_expired(&clock);

    assert_eq!(expired, vec!["call-soon".to_string()]);
    assert_eq!(soon.await.unwrap().unwrap_err().kind, ErrorKind::Timeout);
    assert_eq!(table.len(), 1);
    drop(later);
}

#[tokio::test]
async fn late_worker_reply_after_timeout_is_dropped() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    table.register("call-1", SessionId::new_random(), WorkerId::new_random(), deadline(&clock, 100)).unwrap();
    clock.advance(Duration::from_millis(200));
    table.sweep_expired(&clock);
    assert!(!table.resolve("call-1", serde_json::json!("too late")));
}

#[tokio::test]
async fn cancel_by_session_rejects_only_that_sessions_calls() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let session_a = SessionId::new_random();
    let session_b = SessionId::new_random();
    let worker = WorkerId::new_random();
    let a = table.register("call-a", session_a, worker, deadline(&clock, 1000)).unwrap();
    let b = table.register("call-b", session_b, worker, deadline(&clock, 1000)).unwrap();

    let cancelled = table.cancel_by_session(session_a);
    assert_eq!(cancelled, vec!["call-a".to_string()]);
    assert_eq!(a.await.unwrap().unwrap_err().kind, ErrorKind::ClientGone);
    assert_eq!(table.len(), 1);
    drop(b);
}

#[tokio::test]
async fn cancel_by_worker_rejects_only_calls_targeting_it() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let session = SessionId::new_random();
    let worker_a = WorkerId::new_random();
    let worker_b = WorkerId::new_random();
    let a = table.register("call-a", session, worker_a, deadline(&clock, 1000)).unwrap();
    let b = table.register("call-b", session, worker_b, deadline(&clock, 1000)).unwrap();

    table.cancel_by_worker(worker_a);
    assert_eq!(a.await.unwrap().unwrap_err().kind, ErrorKind::WorkerLost);
    assert_eq!(table.len(), 1);
    drop(b);
}

#[tokio::test]
async fn cancel_sends_no_outcome_at_all() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let rx = table
        .register("call-1", SessionId::new_random(), WorkerId::new_random(), deadline(&clock, 1000))
        .unwrap();
    assert!(table.cancel("call-1"));
    assert!(rx.await.is_err());
    assert!(table.is_empty());
}

#[tokio::test]
async fn cancel_all_rejects_everything_with_shutting_down() {
    let table = CorrelationTable::new();
    let clock = FakeClock::new();
    let session = SessionId::new_random();
    let worker = WorkerId::new_random();
    let a = table.register("call-a", session, worker, deadline(&clock, 1000)).unwrap();
    let b = table.register("call-b", session, worker, deadline(&clock, 1000)).unwrap();

    let rejected = table.cancel_all();
    assert_eq!(rejected.len(), 2);
    assert_eq!(a.await.unwrap().unwrap_err().kind, ErrorKind::ShuttingDown);
    assert_eq!(b.await.unwrap().unwrap_err().kind, ErrorKind::ShuttingDown);
    assert!(table.is_empty());
}
