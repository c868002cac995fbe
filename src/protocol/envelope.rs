//! Envelope encoding and decoding.
//!
//! Inbound text is parsed leniently: a field of the wrong JSON type is treated
//! as absent, and only `isResponse: true` marks a response.

use serde_json::Value;
use tracing::warn;

use crate::common::error::{DispatchError, DispatchResult};
use crate::common::messages::{RawEnvelope, RequestEnvelope, ResponseEnvelope};

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to one of our outbound calls.
    Response(InboundResponse),
    /// Request from the remote side.
    Request(InboundRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundResponse {
    pub action: String,
    pub callback_id: String,
    pub success: bool,
    pub payload: Value,
    /// Failure reason, `None` if the remote gave no usable message.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    pub action: String,
    pub payload: Value,
    /// Present when the remote expects a reply.
    pub callback_id: Option<String>,
}

impl Inbound {
    pub fn action(&self) -> &str {
        match self {
            Self::Response(r) => &r.action,
            Self::Request(r) => &r.action,
        }
    }
}

/// Decode an inbound envelope from its raw text.
pub fn decode(raw: &str) -> DispatchResult<Inbound> {
    let envelope: RawEnvelope = serde_json::from_str(raw)?;

    let action = match envelope.action {
        Value::String(action) if !action.is_empty() => action,
        _ => return Err(DispatchError::MissingAction),
    };

    if envelope.is_response == Value::Bool(true) {
        let callback_id = match envelope.callback_id {
            Value::String(id) if !id.is_empty() => id,
            _ => return Err(DispatchError::MissingCallbackId { action }),
        };
        return Ok(Inbound::Response(InboundResponse {
            action,
            callback_id,
            success: envelope.success == Value::Bool(true),
            payload: envelope.payload,
            error: error_message(envelope.error),
        }));
    }

    let callback_id = match envelope.callback_id {
        Value::String(id) if !id.is_empty() => Some(id),
        Value::Null | Value::String(_) => None,
        other => {
            warn!(
                "Ignoring non-string callbackId {} on request for action \"{}\"",
                other, action
            );
            None
        }
    };

    Ok(Inbound::Request(InboundRequest {
        action,
        payload: envelope.payload,
        callback_id,
    }))
}

/// Extract a usable error message; empty and falsy values yield `None`.
fn error_message(error: Value) -> Option<String> {
    match error {
        Value::String(message) if !message.is_empty() => Some(message),
        Value::Null | Value::Bool(false) | Value::String(_) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Encode an outbound request.
pub fn encode_request(
    action: &str,
    payload: Option<&Value>,
    callback_id: &str,
) -> serde_json::Result<String> {
    serde_json::to_string(&RequestEnvelope::new(action, payload, callback_id))
}

/// Encode an outbound response.
pub fn encode_response(response: &ResponseEnvelope) -> serde_json::Result<String> {
    serde_json::to_string(response)
}
