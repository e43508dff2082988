//! Line protocol — JSON-RPC style request/response framing
//!
//! Wire format (one JSON object per line):
//!
//! Client → Gateway:
//!   { "id": "req-1", "method": "tools.call", "params": { "session": "…", "tool": "search", "args": {} } }
//!
//! Gateway → Client:
//!   { "id": "req-1", "result": { "status": "ok", … } }
//!   { "id": "req-1", "error": { "code": -32000, "message": "…", "data": { "error_kind": "auth" } } }

use crate::error::ErrorEnvelope;
use serde::{Deserialize, Serialize};

/// RPC request from client.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// RPC response to client.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response with a result value.
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    pub fn err(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Error response carrying a gateway error envelope.
    pub fn envelope(id: impl Into<String>, code: i32, envelope: ErrorEnvelope) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: envelope.message.clone(),
                data: Some(envelope),
            }),
        }
    }

    /// Shorthand for a method-not-found error.
    pub fn method_not_found(id: impl Into<String>, method: &str) -> Self {
        Self::err(id, -32601, format!("Method not found: {}", method))
    }

    /// Shorthand for a request that could not be parsed.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::err("", -32700, message)
    }
}

/// RPC error detail.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorEnvelope>,
}
