//! Inbound protocol envelope types
//!
//! The transport layer (out of scope here) decodes frames into these
//! envelopes; the dispatcher turns them into typed mirror mutations. Keep
//! them minimal - add domain-specific types only when needed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a search session held open on the remote end.
pub type SearchId = String;

/// Raw protocol event pushed by the remote end (no request id).
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl ProtocolEvent {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

/// Error reported by the remote end of the inspected-page connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}
