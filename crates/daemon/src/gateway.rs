// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client gateway: the public `/ws` edge. Accepts script/UI clients,
//! sends `welcome`, validates and dispatches `call` frames against the
//! registry, and relays results back using the client's own id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::{CallIdGen, ErrorKind, SessionId};
use relay_wire::{codec, BrokerMessage, ClientMessage};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn, Instrument};

use crate::config::Settings;
use crate::correlation::CorrelationTable;
use crate::registry::Registry;

/// Tracks a session's live calls in both directions so a `cancel` frame
/// (keyed by the client's id) can find the broker-global id, and a worker
/// reply (keyed by the broker-global id) can find the client's id back.
#[derive(Default)]
struct SessionCalls {
    client_to_broker: HashMap<String, String>,
    broker_to_client: HashMap<String, String>,
}

pub struct Gateway {
    correlation: Arc<CorrelationTable>,
    registry: Arc<Registry>,
    settings: Arc<Settings>,
    call_ids: CallIdGen,
}

impl Gateway {
    pub fn new(correlation: Arc<CorrelationTable>, registry: Arc<Registry>, settings: Arc<Settings>) -> Arc<Self> {
        Arc::new(Self { correlation, registry, settings, call_ids: CallIdGen::new() })
    }

    /// The `axum::Router` fragment serving the public WebSocket endpoint.
    pub fn router(self: &Arc<Self>) -> Router {
        let gateway = Arc::clone(self);
        Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let gateway = Arc::clone(&gateway);
                async move { ws.on_upgrade(move |socket| async move { gateway.serve_session(socket).await }) }
            }),
        )
    }
}

impl Gateway {
    async fn serve_session(self: Arc<Self>, socket: WebSocket) {
        let session_id = SessionId::new_random();
        let span = tracing::info_span!("client_session", %session_id);
        self.run_session(session_id, socket).instrument(span).await;
    }

    async fn run_session(self: Arc<Self>, session_id: SessionId, socket: WebSocket) {
        info!(%session_id, "client connected");
        let (mut sink, mut stream) = socket.split();
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<BrokerMessage>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbox_rx.recv().await {
                match codec::encode(&msg) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to encode broker message"),
                }
            }
            let _ = sink.close().await;
        });

        let _ = outbox_tx.send(BrokerMessage::Welcome { functions: self.registry.catalog() });

        let updates_outbox = outbox_tx.clone();
        let mut updates_rx = self.registry.subscribe();
        let updates_task = tokio::spawn(async move {
            loop {
                match updates_rx.recv().await {
                    Ok(functions) => {
                        if updates_outbox.send(BrokerMessage::FunctionsUpdated { functions }).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let calls = Arc::new(Mutex::new(SessionCalls::default()));

        while let Some(frame) = stream.next().await {
            let Ok(msg) = frame else { break };
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            match codec::decode::<ClientMessage>(&text) {
                Ok(codec::Decoded::UnknownType(tag)) => {
                    warn!(%session_id, r#type = %tag, "dropping unrecognised client frame type");
                }
                Ok(codec::Decoded::Message(ClientMessage::Call { id, namespace, function, args })) => {
                    self.handle_call(session_id, id, namespace, function, args, &outbox_tx, &calls);
                }
                Ok(codec::Decoded::Message(ClientMessage::Cancel { id })) => {
                    self.handle_cancel(&id, &calls);
                }
                Err(err) => warn!(%session_id, error = %err, "dropping malformed client frame"),
            }
        }

        updates_task.abort();
        drop(outbox_tx);
        let _ = writer.await;

        let cancelled = self.correlation.cancel_by_session(session_id);
        info!(%session_id, cancelled = cancelled.len(), "client disconnected");
    }

    /// Validate, register, and dispatch one `call` frame.
    /// The reply is relayed by a detached task once the correlation waiter
    /// resolves, so this never blocks the session's read loop.
    fn handle_call(
        self: &Arc<Self>,
        session_id: SessionId,
        client_id: String,
        namespace: String,
        function: String,
        args: serde_json::Value,
        outbox: &mpsc::UnboundedSender<BrokerMessage>,
        calls: &Arc<Mutex<SessionCalls>>,
    ) {
        if !self.registry.has_function(&namespace, &function) {
            let _ = outbox.send(BrokerMessage::error(client_id, ErrorKind::UnknownFunction));
            return;
        }

        let Some(handle) = self.registry.lookup(&namespace) else {
            let _ = outbox.send(BrokerMessage::error(client_id, ErrorKind::WorkerLost));
            return;
        };

        let broker_id = self.call_ids.next();
        {
            let mut calls = calls.lock();
            calls.client_to_broker.insert(client_id.clone(), broker_id.clone());
            calls.broker_to_client.insert(broker_id.clone(), client_id.clone());
        }

        let deadline = Instant::now() + self.settings.call_timeout;
        let Ok(rx) = self.correlation.register(broker_id.clone(), session_id, handle.id(), deadline) else {
            warn!(%broker_id, "call id collision, dropping call");
            return;
        };

        if handle.dispatch(broker_id.clone(), function, args).is_err() {
            self.correlation.reject(&broker_id, ErrorKind::WorkerLost);
        }

        let outbox = outbox.clone();
        let calls = Arc::clone(calls);
        tokio::spawn(async move {
            if let Ok(outcome) = rx.await {
                match outcome {
                    Ok(data) => {
                        let _ = outbox.send(BrokerMessage::result(client_id.clone(), data));
                    }
                    Err(failure) if !failure.kind.is_internal_only() => {
                        let _ = outbox.send(BrokerMessage::error_with_detail(client_id.clone(), failure.kind, failure.detail));
                    }
                    Err(_) => {}
                }
            }
            let mut calls = calls.lock();
            calls.client_to_broker.remove(&client_id);
            calls.broker_to_client.remove(&broker_id);
        });
    }

    /// A `cancel` frame removes the correlation entry and writes no reply
    /// at all for that id: the waiter's sender is simply
    /// dropped, so the relay task above sees a closed channel and stays
    /// silent.
    fn handle_cancel(&self, client_id: &str, calls: &Arc<Mutex<SessionCalls>>) {
        let broker_id = calls.lock().client_to_broker.get(client_id).cloned();
        if let Some(broker_id) = broker_id {
            self.correlation.cancel(&broker_id);
        }
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
