// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ambient RPC client a running script is handed, letting it call into
//! any live namespace as `rpc.<namespace>.<function>(args)` without its own
//! transport code. It is an ordinary client of [`crate`]'s gateway edge: it
//! connects to the public `/ws` endpoint, receives `welcome`, and issues
//! `call` frames the same way the CLI or web UI would — there is no
//! privileged back channel into the broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::{CallIdGen, FunctionDescriptor};
use relay_wire::{codec, BrokerMessage, ClientMessage};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("connection to the gateway is closed")]
    Disconnected,
    #[error("call timed out waiting for a reply")]
    Timeout,
    #[error("remote error: {kind}{}", detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Remote { kind: String, detail: Option<String> },
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to gateway at {url}: {source}")]
    Dial { url: String, source: tokio_tungstenite::tungstenite::Error },
}

struct Shared {
    outbox: tokio::sync::mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value, CallError>>>>,
    call_ids: CallIdGen,
    catalog: Mutex<Vec<FunctionDescriptor>>,
}

/// One connection to the gateway, used as the script's ambient RPC proxy.
///
/// Cheap to clone: every clone shares the same underlying socket and
/// pending-call table, mirroring [`relay_daemon::worker_transport::WorkerHandle`]'s
/// reference-counted-handle shape on the other edge of the broker.
#[derive(Clone)]
pub struct RpcClient {
    shared: Arc<Shared>,
}

impl RpcClient {
    /// Connect to the gateway's public WebSocket endpoint and start the
    /// background reader that demultiplexes replies by id.
    pub async fn connect(url: &str) -> Result<Self, ConnectError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| ConnectError::Dial { url: url.to_string(), source })?;
        let (mut sink, mut stream) = ws.split();
        let (outbox_tx, mut outbox_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

        let shared = Arc::new(Shared {
            outbox: outbox_tx,
            pending: Mutex::new(HashMap::new()),
            call_ids: CallIdGen::new(),
            catalog: Mutex::new(Vec::new()),
        });

        tokio::spawn(async move {
            while let Some(msg) = outbox_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let Ok(Message::Text(text)) = frame else { break };
                match codec::decode::<BrokerMessage>(&text) {
                    Ok(codec::Decoded::Message(msg)) => reader_shared.handle(msg),
                    Ok(codec::Decoded::UnknownType(tag)) => warn!(r#type = %tag, "dropping unrecognised broker frame"),
                    Err(err) => warn!(error = %err, "dropping malformed broker frame"),
                }
            }
            // Connection dropped: wake every still-pending caller rather than
            // leaving them hung until their own timeout.
            let mut pending = reader_shared.pending.lock();
            for (_, waiter) in pending.drain() {
                let _ = waiter.send(Err(CallError::Disconnected));
            }
        });

        Ok(Self { shared })
    }

    fn handle(&self, msg: BrokerMessage) {
        match msg {
            BrokerMessage::Welcome { functions } | BrokerMessage::FunctionsUpdated { functions } => {
                *self.shared.catalog.lock() = functions;
            }
            BrokerMessage::Result { id, data } => self.complete(&id, Ok(data)),
            BrokerMessage::Error { id, error, detail } => self.complete(&id, Err(CallError::Remote { kind: error, detail })),
        }
    }

    fn complete(&self, id: &str, outcome: Result<serde_json::Value, CallError>) {
        if let Some(waiter) = self.shared.pending.lock().remove(id) {
            let _ = waiter.send(outcome);
        }
    }

    /// Invoke `namespace.function(args)` through the gateway. Bounded by
    /// `timeout`; on expiry the pending entry is dropped so a very late
    /// reply is silently ignored, matching the broker side's own timeout
    /// contract on the correlation table.
    pub async fn call(
        &self,
        namespace: &str,
        function: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, CallError> {
        let id = self.shared.call_ids.next();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);

        let frame = ClientMessage::Call { id: id.clone(), namespace: namespace.to_string(), function: function.to_string(), args };
        let text = codec::encode(&frame).map_err(|_| CallError::Disconnected)?;
        if self.shared.outbox.send(Message::Text(text)).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(CallError::Disconnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CallError::Disconnected),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(CallError::Timeout)
            }
        }
    }

    /// The function catalog most recently reported by `welcome` or
    /// `functions_updated`.
    pub fn catalog(&self) -> Vec<FunctionDescriptor> {
        self.shared.catalog.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_detail_when_present() {
        let err = CallError::Remote { kind: "function_error".to_string(), detail: Some("boom".to_string()) };
        assert_eq!(err.to_string(), "remote error: function_error (boom)");
    }

    #[test]
    fn remote_error_display_omits_detail_when_absent() {
        let err = CallError::Remote { kind: "unknown_function".to_string(), detail: None };
        assert_eq!(err.to_string(), "remote error: unknown_function");
    }
}
