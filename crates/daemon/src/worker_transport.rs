// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker transport: one persistent WebSocket session per worker
//! subprocess. Workers dial *into* the broker, so the broker terminates
//! this edge as an `axum` WebSocket server, the same way [`crate::gateway`]
//! terminates the client edge. Outbound writes are serialized per worker
//! through an mpsc channel feeding a single writer task; inbound frames are
//! demultiplexed by call-id and forwarded to the correlation table.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::{ErrorKind, WorkerId};
use relay_wire::{codec, WorkerCommand, WorkerEvent};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::correlation::CorrelationTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawning,
    Ready,
    Draining,
    Dead,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("worker {0} is not connected")]
    NotConnected(WorkerId),
    #[error("worker {0} session is gone")]
    Closed(WorkerId),
}

struct HandleInner {
    id: WorkerId,
    namespace: String,
    state: Mutex<WorkerState>,
    outbox: mpsc::UnboundedSender<WorkerCommand>,
    in_flight: Mutex<HashSet<String>>,
    spawned_at: Instant,
    restart_count: AtomicU32,
}

/// A live (or recently live) worker session. Cheap to clone; every clone
/// refers to the same underlying connection.
#[derive(Clone)]
pub struct WorkerHandle(Arc<HandleInner>);

impl WorkerHandle {
    fn new(id: WorkerId, namespace: String, outbox: mpsc::UnboundedSender<WorkerCommand>, spawned_at: Instant) -> Self {
        Self(Arc::new(HandleInner {
            id,
            namespace,
            state: Mutex::new(WorkerState::Spawning),
            outbox,
            in_flight: Mutex::new(HashSet::new()),
            spawned_at,
            restart_count: AtomicU32::new(0),
        }))
    }

    pub fn id(&self) -> WorkerId {
        self.0.id
    }

    pub fn namespace(&self) -> &str {
        &self.0.namespace
    }

    pub fn state(&self) -> WorkerState {
        *self.0.state.lock()
    }

    pub fn set_state(&self, state: WorkerState) {
        *self.0.state.lock() = state;
    }

    pub fn is_ready(&self) -> bool {
        self.state() == WorkerState::Ready
    }

    pub fn spawned_at(&self) -> Instant {
        self.0.spawned_at
    }

    pub fn restart_count(&self) -> u32 {
        self.0.restart_count.load(Ordering::Relaxed)
    }

    pub fn note_restart(&self) -> u32 {
        self.0.restart_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn in_flight_count(&self) -> usize {
        self.0.in_flight.lock().len()
    }

    fn track_call(&self, id: String) {
        self.0.in_flight.lock().insert(id);
    }

    fn untrack_call(&self, id: &str) {
        self.0.in_flight.lock().remove(id);
    }

    /// Dispatch a call to this worker. Only permitted once READY.
    pub fn dispatch(&self, id: String, function_name: String, args: serde_json::Value) -> Result<(), TransportError> {
        if !self.is_ready() && self.state() != WorkerState::Draining {
            return Err(TransportError::NotConnected(self.id()));
        }
        self.track_call(id.clone());
        self.0
            .outbox
            .send(WorkerCommand::Call { id: id.clone(), function_name, args })
            .map_err(|_| {
                self.untrack_call(&id);
                TransportError::Closed(self.id())
            })
    }

    pub fn send_shutdown(&self) -> Result<(), TransportError> {
        self.0.outbox.send(WorkerCommand::Shutdown).map_err(|_| TransportError::Closed(self.id()))
    }
}

/// Reported when a worker session ends, whether cleanly or not. The
/// supervisor listens for these to drive restarts.
#[derive(Debug, Clone)]
pub struct WorkerLostEvent {
    pub worker_id: WorkerId,
    pub namespace: String,
    pub reason: String,
}

/// A worker's identity plus the function catalog it reported READY with.
pub type ReadyWorker = (WorkerHandle, Vec<relay_core::FunctionDescriptor>);

struct PendingExpectation {
    namespace: String,
    ready_tx: oneshot::Sender<ReadyWorker>,
}

/// Owns the connection lifecycle of every worker session. A [`crate::supervisor::Supervisor`]
/// calls [`WorkerTransport::expect`] before spawning a subprocess, then
/// awaits the returned receiver for the READY handshake.
pub struct WorkerTransport {
    pending: Mutex<std::collections::HashMap<WorkerId, PendingExpectation>>,
    active: Mutex<std::collections::HashMap<WorkerId, WorkerHandle>>,
    lost_tx: mpsc::UnboundedSender<WorkerLostEvent>,
    lost_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerLostEvent>>>,
}

impl WorkerTransport {
    pub fn new() -> Arc<Self> {
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            pending: Mutex::new(std::collections::HashMap::new()),
            active: Mutex::new(std::collections::HashMap::new()),
            lost_tx,
            lost_rx: Mutex::new(Some(lost_rx)),
        })
    }

    /// Register that a worker with this identity token is about to be
    /// spawned; returns a receiver that completes once it has identified
    /// and signalled READY.
    pub fn expect(&self, worker_id: WorkerId, namespace: impl Into<String>) -> oneshot::Receiver<ReadyWorker> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(worker_id, PendingExpectation { namespace: namespace.into(), ready_tx: tx });
        rx
    }

    /// Stop waiting for a worker that never connected in time; called by
    /// the supervisor after its ready-timeout elapses.
    pub fn forget(&self, worker_id: WorkerId) {
        self.pending.lock().remove(&worker_id);
    }

    pub fn lookup(&self, worker_id: WorkerId) -> Option<WorkerHandle> {
        self.active.lock().get(&worker_id).cloned()
    }

    /// Take ownership of the worker-lost event stream. Panics if called
    /// more than once — there is exactly one supervisor consumer.
    #[allow(clippy::expect_used)]
    pub fn take_lost_events(&self) -> mpsc::UnboundedReceiver<WorkerLostEvent> {
        self.lost_rx.lock().take().expect("worker-lost events already taken")
    }

    /// Drive one worker's WebSocket session to completion. Call this from
    /// the axum handler for the worker-facing upgrade route.
    pub async fn serve_connection(self: Arc<Self>, socket: WebSocket, correlation: Arc<CorrelationTable>) {
        let (mut sink, mut stream) = socket.split();
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<WorkerCommand>();
        let mut bound: Option<WorkerId> = None;

        let writer = tokio::spawn(async move {
            while let Some(cmd) = outbox_rx.recv().await {
                match codec::encode(&cmd) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to encode worker command"),
                }
            }
            let _ = sink.close().await;
        });

        while let Some(frame) = stream.next().await {
            let Ok(msg) = frame else { break };
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            match codec::decode::<WorkerEvent>(&text) {
                Ok(codec::Decoded::UnknownType(tag)) => {
                    warn!(r#type = %tag, "dropping unrecognised worker frame type");
                }
                Ok(codec::Decoded::Message(event)) => {
                    bound = self.handle_event(bound, event, &outbox_tx, &correlation).await;
                }
                Err(err) => warn!(error = %err, "dropping malformed worker frame"),
            }
        }

        drop(outbox_tx);
        let _ = writer.await;

        if let Some(worker_id) = bound {
            self.mark_lost(worker_id, "worker connection closed".to_string(), &correlation);
        }
    }

    async fn handle_event(
        &self,
        bound: Option<WorkerId>,
        event: WorkerEvent,
        outbox: &mpsc::UnboundedSender<WorkerCommand>,
        correlation: &Arc<CorrelationTable>,
    ) -> Option<WorkerId> {
        match event {
            WorkerEvent::Identify { worker_id } => {
                let worker_id = WorkerId::from_string(worker_id);
                let Some(expectation) = self.pending.lock().get(&worker_id).map(|e| e.namespace.clone()) else {
                    warn!(%worker_id, "identify from unexpected worker id, dropping connection");
                    return None;
                };
                let handle = WorkerHandle::new(worker_id, expectation, outbox.clone(), Instant::now());
                self.active.lock().insert(worker_id, handle);
                debug!(%worker_id, "worker identified");
                Some(worker_id)
            }
            WorkerEvent::Ready { worker_id, functions } => {
                let worker_id = WorkerId::from_string(worker_id);
                if let Some(handle) = self.active.lock().get(&worker_id).cloned() {
                    handle.set_state(WorkerState::Ready);
                    if let Some(expectation) = self.pending.lock().remove(&worker_id) {
                        info!(%worker_id, namespace = %handle.namespace(), "worker ready");
                        let _ = expectation.ready_tx.send((handle, functions));
                    }
                }
                bound
            }
            WorkerEvent::Result { id, data } => {
                if let Some(worker_id) = bound {
                    self.untrack(worker_id, &id);
                }
                correlation.resolve(&id, data);
                bound
            }
            WorkerEvent::Error { id, error } => {
                if let Some(worker_id) = bound {
                    self.untrack(worker_id, &id);
                }
                correlation.reject_with_detail(&id, ErrorKind::FunctionError, error);
                bound
            }
            WorkerEvent::Crash { error } => {
                if let Some(worker_id) = bound {
                    self.mark_lost(worker_id, error, correlation);
                }
                bound
            }
        }
    }

    fn untrack(&self, worker_id: WorkerId, call_id: &str) {
        if let Some(handle) = self.active.lock().get(&worker_id).cloned() {
            handle.untrack_call(call_id);
        }
    }

    fn mark_lost(&self, worker_id: WorkerId, reason: String, correlation: &Arc<CorrelationTable>) {
        let Some(handle) = self.active.lock().remove(&worker_id) else { return };
        handle.set_state(WorkerState::Dead);
        correlation.cancel_by_worker(worker_id);
        let _ = self.lost_tx.send(WorkerLostEvent { worker_id, namespace: handle.namespace().to_string(), reason });
    }
}

#[cfg(test)]
#[path = "worker_transport_tests.rs"]
mod tests;
