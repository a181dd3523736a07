//! JSON-RPC envelopes for the MCP stdio channel.
//!
//! The wire format is newline-delimited JSON-RPC 2.0. One incoming shape
//! covers results, server-initiated requests and notifications; the reader
//! task tells them apart by which fields are present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing request: `{jsonrpc, id, method, params}`.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outgoing notification: a request without an id; no response expected.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Outgoing response to a server-initiated request (e.g. `roots/list`).
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: Value,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Error object inside a JSON-RPC result.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Any incoming line: result, server request, or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

impl Incoming {
    /// Result for one of our requests: has an id and no method.
    pub fn is_result(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    /// Server-initiated request: has both id and method.
    pub fn is_server_request(&self) -> bool {
        self.id.is_some() && self.method.is_some()
    }

    /// Numeric request id, when the id is one we issued.
    pub fn request_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(|v| v.as_u64())
    }
}
