//! RPC envelope exchanged over a broker stream.
//!
//! Every stream payload is one JSON-encoded [`Message`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Error, Result};

/// RPC-level failure reasons, distinct from errors a backend returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    UnknownMethod,
    InvalidArgument,
    Internal,
    Unavailable,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::UnknownMethod => "unknown method",
            StatusCode::InvalidArgument => "invalid argument",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(StatusCode::UnknownMethod, format!("unknown method {}", method))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn into_error(self, method: &str) -> Error {
        Error::Rpc { method: method.to_string(), code: self.code, message: self.message }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Request expecting exactly one [`Message::Reply`] with the same `seq`.
    Call {
        seq: u64,
        method: String,
        #[serde(default)]
        body: serde_json::Value,
    },
    /// One-way message; never answered. Applied in arrival order.
    Notify {
        method: String,
        #[serde(default)]
        body: serde_json::Value,
    },
    Reply {
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcStatus>,
    },
}

impl Message {
    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| Error::codec(e, "failed to encode RPC message"))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::codec(e, "failed to decode RPC message"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_envelope_shape() {
        let msg = Message::Call {
            seq: 7,
            method: "Backend.HandleRequest".into(),
            body: json!({"path": "kv/foo"}),
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "call");
        assert_eq!(value["seq"], 7);
        assert!(value.get("timeout_ms").is_none());
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_status_conversion() {
        let err = RpcStatus::new(StatusCode::Unavailable, "not set up").into_error("Backend.Type");
        assert!(matches!(err, Error::Rpc { code: StatusCode::Unavailable, .. }));
        assert!(err.is_transport());

        let err = RpcStatus::unknown_method("Backend.Nope").into_error("Backend.Nope");
        assert!(matches!(err, Error::Rpc { code: StatusCode::UnknownMethod, .. }));
    }

    #[test]
    fn test_garbage_is_codec_error() {
        assert!(matches!(Message::decode(b"not json"), Err(Error::Codec { .. })));
    }
}
