// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tolerant decoding for the two text-frame vocabularies.
//!
//! Unknown `type` values are logged and ignored rather than treated as a
//! protocol violation, so a newer client or worker can add message kinds
//! without breaking an older broker. A frame whose `type` is recognised but
//! whose fields don't parse is reported as [`DecodeError::NotJson`].

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("frame has no string \"type\" field")]
    MissingType,
}

/// Outcome of decoding one text frame into `T`.
#[derive(Debug)]
pub enum Decoded<T> {
    /// A recognised, well-formed message.
    Message(T),
    /// A syntactically valid envelope whose `type` this vocabulary doesn't
    /// know. Callers should log and drop it, not treat it as an error.
    UnknownType(String),
}

/// Decode one text frame against a `#[serde(tag = "type")]` enum, turning
/// "unrecognised variant" into [`Decoded::UnknownType`] instead of an error.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<Decoded<T>, DecodeError> {
    let envelope: serde_json::Value = serde_json::from_str(text)?;
    let type_tag = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();

    match serde_json::from_value::<T>(envelope) {
        Ok(msg) => Ok(Decoded::Message(msg)),
        Err(err) => {
            if is_unknown_variant_error(&err) {
                Ok(Decoded::UnknownType(type_tag))
            } else {
                Err(DecodeError::NotJson(err))
            }
        }
    }
}

/// serde's internally-tagged enum deserializer reports an unrecognised tag
/// as a generic "unknown variant" message; there's no structured variant
/// for it, so we match on the text it produces.
fn is_unknown_variant_error(err: &serde_json::Error) -> bool {
    err.to_string().contains("unknown variant")
}

/// Serialize an outbound message to a single text frame.
pub fn encode<T: serde::Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientMessage;

    #[test]
    fn decodes_known_message() {
        let text = r#"{"type":"cancel","id":"c1"}"#;
        match decode::<ClientMessage>(text).unwrap() {
            Decoded::Message(ClientMessage::Cancel { id }) => assert_eq!(id, "c1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_reported_not_errored() {
        let text = r#"{"type":"ping"}"#;
        match decode::<ClientMessage>(text).unwrap() {
            Decoded::UnknownType(tag) => assert_eq!(tag, "ping"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_json_is_an_error() {
        let err = decode::<ClientMessage>("not json").unwrap_err();
        assert!(matches!(err, DecodeError::NotJson(_)));
    }

    #[test]
    fn missing_type_is_an_error() {
        let err = decode::<ClientMessage>(r#"{"id":"c1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingType));
    }

    #[test]
    fn malformed_known_type_is_an_error() {
        // "call" is known but missing the required "namespace"/"function" fields.
        let text = r#"{"type":"call","id":"c1"}"#;
        let err = decode::<ClientMessage>(text).unwrap_err();
        assert!(matches!(err, DecodeError::NotJson(_)));
    }
}
