// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire messages on the broker ↔ worker edge.
//!
//! Workers dial out to the broker; the broker is the WebSocket server on
//! both edges. The worker-facing frames are a distinct vocabulary from the
//! client-facing ones even though they share a transport.

use relay_core::FunctionDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message the broker sends down to a worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    Call {
        id: String,
        #[serde(rename = "functionName")]
        function_name: String,
        #[serde(default)]
        args: Value,
    },
    Shutdown,
}

/// A message a worker sends up to the broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Identify {
        #[serde(rename = "workerId")]
        worker_id: String,
    },
    /// `functions` is an extension beyond the wire protocol's minimal shape: the
    /// worker reports its catalog alongside readiness so the registry
    /// doesn't need a separate out-of-band introspection round trip.
    Ready {
        #[serde(rename = "workerId")]
        worker_id: String,
        #[serde(default)]
        functions: Vec<FunctionDescriptor>,
    },
    Result {
        id: String,
        data: Value,
    },
    Error {
        id: String,
        error: String,
    },
    Crash {
        error: String,
    },
}

impl WorkerEvent {
    /// The call-id this event resolves, when it carries one. `Identify`,
    /// `Ready` and `Crash` are not tied to a single in-flight call.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            WorkerEvent::Result { id, .. } | WorkerEvent::Error { id, .. } => Some(id),
            WorkerEvent::Identify { .. } | WorkerEvent::Ready { .. } | WorkerEvent::Crash { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_command_serializes_camel_case_function_name() {
        let cmd = WorkerCommand::Call { id: "call-1".into(), function_name: "set".into(), args: Value::Null };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "call");
        assert_eq!(json["functionName"], "set");
    }

    #[test]
    fn shutdown_command_has_no_payload_fields() {
        let json = serde_json::to_value(&WorkerCommand::Shutdown).unwrap();
        assert_eq!(json["type"], "shutdown");
    }

    #[test]
    fn identify_event_deserializes_camel_case_worker_id() {
        let json = r#"{"type":"identify","workerId":"wkr-abc"}"#;
        let ev: WorkerEvent = serde_json::from_str(json).unwrap();
        match ev {
            WorkerEvent::Identify { worker_id } => assert_eq!(worker_id, "wkr-abc"),
            _ => panic!("expected Identify"),
        }
    }

    #[test]
    fn result_and_error_events_expose_call_id() {
        let result: WorkerEvent = serde_json::from_str(r#"{"type":"result","id":"c1","data":null}"#).unwrap();
        assert_eq!(result.call_id(), Some("c1"));
        let error: WorkerEvent = serde_json::from_str(r#"{"type":"error","id":"c2","error":"function_error"}"#).unwrap();
        assert_eq!(error.call_id(), Some("c2"));
    }

    #[test]
    fn crash_event_has_no_call_id() {
        let ev: WorkerEvent = serde_json::from_str(r#"{"type":"crash","error":"boom"}"#).unwrap();
        assert_eq!(ev.call_id(), None);
    }

    #[test]
    fn ready_event_defaults_to_empty_catalog_when_omitted() {
        let ev: WorkerEvent = serde_json::from_str(r#"{"type":"ready","workerId":"wkr-abc"}"#).unwrap();
        match ev {
            WorkerEvent::Ready { worker_id, functions } => {
                assert_eq!(worker_id, "wkr-abc");
                assert!(functions.is_empty());
            }
            _ => panic!("expected Ready"),
        }
    }

    #[test]
    fn ready_event_carries_reported_catalog() {
        let json = r#"{"type":"ready","workerId":"wkr-abc","functions":[{"name":"set","namespace":"kv"}]}"#;
        let ev: WorkerEvent = serde_json::from_str(json).unwrap();
        match ev {
            WorkerEvent::Ready { functions, .. } => assert_eq!(functions.len(), 1),
            _ => panic!("expected Ready"),
        }
    }
}
