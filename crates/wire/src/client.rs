// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire messages on the client ↔ broker edge, the public `/ws` endpoint.

use relay_core::{ErrorKind, FunctionDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message sent by a script/UI client to the broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Call {
        id: String,
        namespace: String,
        function: String,
        #[serde(default)]
        args: Value,
    },
    Cancel {
        id: String,
    },
}

impl ClientMessage {
    /// The client-supplied call-id, when this message carries one.
    pub fn id(&self) -> &str {
        match self {
            ClientMessage::Call { id, .. } => id,
            ClientMessage::Cancel { id } => id,
        }
    }
}

/// A message sent by the broker to a script/UI client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerMessage {
    Welcome {
        functions: Vec<FunctionDescriptor>,
    },
    Result {
        id: String,
        data: Value,
    },
    Error {
        id: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    FunctionsUpdated {
        functions: Vec<FunctionDescriptor>,
    },
}

impl BrokerMessage {
    pub fn error(id: impl Into<String>, kind: ErrorKind) -> Self {
        Self::error_with_detail(id, kind, None)
    }

    /// `detail` carries the worker's own message for `function_error`;
    /// every other kind leaves it unset.
    pub fn error_with_detail(id: impl Into<String>, kind: ErrorKind, detail: Option<String>) -> Self {
        debug_assert!(!kind.is_internal_only(), "internal-only error kind leaked onto the wire");
        BrokerMessage::Error { id: id.into(), error: kind.as_str().to_string(), detail }
    }

    pub fn result(id: impl Into<String>, data: Value) -> Self {
        BrokerMessage::Result { id: id.into(), data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_deserializes_with_default_args() {
        let json = r#"{"type":"call","id":"c1","namespace":"kv","function":"set"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Call { id, namespace, function, args } => {
                assert_eq!(id, "c1");
                assert_eq!(namespace, "kv");
                assert_eq!(function, "set");
                assert_eq!(args, Value::Null);
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn cancel_deserializes() {
        let json = r#"{"type":"cancel","id":"c7"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id(), "c7");
    }

    #[test]
    fn error_message_serializes_kind_as_string() {
        let msg = BrokerMessage::error("c2", ErrorKind::UnknownFunction);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "unknown_function");
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn error_message_carries_optional_detail() {
        let msg = BrokerMessage::error_with_detail("c2", ErrorKind::FunctionError, Some("boom".to_string()));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["detail"], "boom");
    }

    #[test]
    #[should_panic]
    fn error_message_rejects_internal_only_kind_in_debug() {
        let _ = BrokerMessage::error("c3", ErrorKind::ClientGone);
    }

    #[test]
    fn welcome_serializes_function_list() {
        let msg = BrokerMessage::Welcome { functions: vec![] };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "welcome");
        assert!(json["functions"].as_array().unwrap().is_empty());
    }
}
