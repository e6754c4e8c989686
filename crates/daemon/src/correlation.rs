// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation table: maps a pending call-id to its waiter, origin
//! session, target worker, and deadline. The single point of timeout
//! enforcement; resolve and reject are idempotent.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use relay_core::{Clock, ErrorKind, SessionId, WorkerId};
use thiserror::Error;
use tokio::sync::oneshot;

/// A rejected call's kind plus, for `function_error`, the worker's own
/// message, since a function_error's payload carries the worker's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: ErrorKind,
    pub detail: Option<String>,
}

impl CallFailure {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: Some(detail.into()) }
    }
}

/// What a pending call eventually produces.
pub type CallOutcome = Result<serde_json::Value, CallFailure>;

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("call id {0} is already registered")]
    Duplicate(String),
}

struct Entry {
    origin_session: SessionId,
    target_worker: WorkerId,
    deadline: Instant,
    waiter: oneshot::Sender<CallOutcome>,
}

/// Mutex-protected map of call-id to waiter record. The lock only
/// ever guards map mutation, never I/O: resolving a call is a non-blocking
/// oneshot send taken under the same critical section as the map removal.
#[derive(Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, Entry>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending call. Fails if `id` is already tracked.
    pub fn register(
        &self,
        id: impl Into<String>,
        origin_session: SessionId,
        target_worker: WorkerId,
        deadline: Instant,
    ) -> Result<oneshot::Receiver<CallOutcome>, CorrelationError> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(CorrelationError::Duplicate(id));
        }
        entries.insert(id, Entry { origin_session, target_worker, deadline, waiter: tx });
        Ok(rx)
    }

    /// Resolve a call with a successful result. Returns `false` if the call
    /// was already resolved, rejected, or cancelled — late worker replies
    /// after timeout or cancellation are silently dropped this way.
    pub fn resolve(&self, id: &str, data: serde_json::Value) -> bool {
        self.complete(id, Ok(data))
    }

    /// Reject a call with an error kind. Idempotent like [`resolve`].
    ///
    /// [`resolve`]: Self::resolve
    pub fn reject(&self, id: &str, kind: ErrorKind) -> bool {
        self.complete(id, Err(CallFailure::new(kind)))
    }

    /// Reject a call carrying the worker's own error message (`function_error`).
    pub fn reject_with_detail(&self, id: &str, kind: ErrorKind, detail: impl Into<String>) -> bool {
        self.complete(id, Err(CallFailure::with_detail(kind, detail)))
    }

    fn complete(&self, id: &str, outcome: CallOutcome) -> bool {
        let entry = self.entries.lock().remove(id);
        match entry {
            Some(entry) => entry.waiter.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Remove a call's entry without sending any outcome at all — used for
    /// an explicit client `cancel` frame, whose external contract is
    /// silence rather than a reply.
    pub fn cancel(&self, id: &str) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Reject every call owned by a closing client session with `client_gone`.
    pub fn cancel_by_session(&self, session: SessionId) -> Vec<String> {
        self.reject_matching(|entry| entry.origin_session == session, ErrorKind::ClientGone)
    }

    /// Reject every call targeting a worker that was lost, with `worker_lost`.
    pub fn cancel_by_worker(&self, worker: WorkerId) -> Vec<String> {
        self.reject_matching(|entry| entry.target_worker == worker, ErrorKind::WorkerLost)
    }

    /// Reject every pending call with `shutting_down`, used during broker shutdown.
    pub fn cancel_all(&self) -> Vec<String> {
        self.reject_matching(|_| true, ErrorKind::ShuttingDown)
    }

    fn reject_matching(&self, predicate: impl Fn(&Entry) -> bool, kind: ErrorKind) -> Vec<String> {
        let mut entries = self.entries.lock();
        let ids: Vec<String> = entries.iter().filter(|(_, e)| predicate(e)).map(|(id, _)| id.clone()).collect();
        let mut rejected = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = entries.remove(&id) {
                let _ = entry.waiter.send(Err(CallFailure::new(kind)));
                rejected.push(id);
            }
        }
        rejected
    }

    /// Reject every call whose deadline has passed as of `clock.now()`, with
    /// `timeout`. Callers drive this on a periodic tick.
    pub fn sweep_expired(&self, clock: &impl Clock) -> Vec<String> {
        let now = clock.now();
        self.reject_matching_expired(now)
    }

    fn reject_matching_expired(&self, now: Instant) -> Vec<String> {
        let mut entries = self.entries.lock();
        let ids: Vec<String> = entries.iter().filter(|(_, e)| e.deadline <= now).map(|(id, _)| id.clone()).collect();
        let mut expired = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = entries.remove(&id) {
                let _ = entry.waiter.send(Err(CallFailure::new(ErrorKind::Timeout)));
                expired.push(id);
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;
