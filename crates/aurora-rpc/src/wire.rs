// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC 2.0 envelope types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard and implementation-defined JSON-RPC error codes.
pub mod error_codes {
    /// The body is not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// The body is JSON but not a valid request envelope.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method name is not in the dispatch table.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// The params do not deserialize into the method's request type.
    pub const INVALID_PARAMS: i64 = -32602;
    /// A service-level failure; the message carries the detail.
    pub const SERVER_ERROR: i64 = -32000;
}

/// An incoming request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version; always `"2.0"`.
    pub jsonrpc: String,
    /// Dispatch key, `Service.Method`.
    pub method: String,
    /// The request object (or a single-element array wrapping it).
    #[serde(default)]
    pub params: Value,
    /// Caller-chosen correlation id, echoed back.
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    /// The request object, unwrapping the positional single-element array
    /// form some codecs produce.
    pub fn params_object(&self) -> Value {
        match &self.params {
            Value::Array(items) if items.len() == 1 => items[0].clone(),
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        }
    }
}

/// An outgoing response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version; always `"2.0"`.
    pub jsonrpc: String,
    /// The method result; absent on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error object; absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    /// Echo of the request id.
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    /// A successful response carrying `result`.
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// A failed response carrying an error object.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// The JSON-RPC error member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code; see [`error_codes`].
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}
