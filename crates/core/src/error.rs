// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds surfaced to clients over the wire.
//!
//! These are string discriminators, not Rust `Error` types — they travel
//! in the `error` field of a `{type:"error", id, error}` frame. `client_gone`
//! is internal-only and is asserted never to serialize onto the wire.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownFunction,
    InvalidMessage,
    Timeout,
    WorkerLost,
    /// Internal only — reported when a session closes. Never sent on the wire.
    ClientGone,
    ShuttingDown,
    FunctionError,
    NamespaceBroken,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownFunction => "unknown_function",
            ErrorKind::InvalidMessage => "invalid_message",
            ErrorKind::Timeout => "timeout",
            ErrorKind::WorkerLost => "worker_lost",
            ErrorKind::ClientGone => "client_gone",
            ErrorKind::ShuttingDown => "shutting_down",
            ErrorKind::FunctionError => "function_error",
            ErrorKind::NamespaceBroken => "namespace_broken",
        }
    }

    /// `client_gone` is an internal bookkeeping signal only; it must
    /// never be written to a client socket.
    pub fn is_internal_only(&self) -> bool {
        matches!(self, ErrorKind::ClientGone)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnknownFunction).unwrap();
        assert_eq!(json, "\"unknown_function\"");
        let json = serde_json::to_string(&ErrorKind::WorkerLost).unwrap();
        assert_eq!(json, "\"worker_lost\"");
    }

    #[test]
    fn client_gone_is_marked_internal() {
        assert!(ErrorKind::ClientGone.is_internal_only());
        assert!(!ErrorKind::Timeout.is_internal_only());
    }

    #[test]
    fn round_trips_through_display() {
        for kind in [
            ErrorKind::UnknownFunction,
            ErrorKind::InvalidMessage,
            ErrorKind::Timeout,
            ErrorKind::WorkerLost,
            ErrorKind::ShuttingDown,
            ErrorKind::FunctionError,
            ErrorKind::NamespaceBroken,
        ] {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
