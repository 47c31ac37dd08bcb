//! Request payloads and how they become body bytes.
//!
//! Three shapes reach the wire differently: raw bytes go out unchanged,
//! text and integers go out as the UTF-8 of their text form, and any other
//! object goes out as its JSON text. A missing payload is an empty body.

use serde::Serialize;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Sent as-is, e.g. an encoded protobuf message.
    Bytes(Vec<u8>),
    Text(String),
    Integer(i64),
    /// Pre-serialized JSON text of an arbitrary object.
    Json(String),
}

impl Payload {
    /// Serialize `value` to JSON now so encoding the body cannot fail later.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_string(value)
            .map(Payload::Json)
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }

    /// Encode a prost message as a `Bytes` payload.
    pub fn protobuf<M: prost::Message>(message: &M) -> Self {
        Payload::Bytes(message.encode_to_vec())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Bytes(bytes) => bytes.clone(),
            Payload::Text(text) => text.as_bytes().to_vec(),
            Payload::Integer(n) => n.to_string().into_bytes(),
            Payload::Json(json) => json.as_bytes().to_vec(),
        }
    }
}

/// Body bytes for an optional payload.
pub fn encode_body(payload: Option<&Payload>) -> Vec<u8> {
    payload.map(Payload::to_bytes).unwrap_or_default()
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<i32> for Payload {
    fn from(n: i32) -> Self {
        Payload::Integer(i64::from(n))
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Integer(n)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value.to_string())
    }
}
