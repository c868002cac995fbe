//! Canonical envelope types exchanged with the host.
//!
//! Every message on the wire is a JSON object with an `action` name. Requests
//! may carry a `callbackId` when the sender wants a reply; responses echo the
//! action and callback id and report success or failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope<'a> {
    pub action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a Value>,
    pub callback_id: &'a str,
    pub is_response: bool,
}

impl<'a> RequestEnvelope<'a> {
    pub fn new(action: &'a str, payload: Option<&'a Value>, callback_id: &'a str) -> Self {
        Self {
            action,
            payload,
            callback_id,
            is_response: false,
        }
    }
}

/// Outbound response envelope, sent in reply to a request that carried a
/// callback id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub action: String,
    pub callback_id: String,
    pub is_response: bool,
    pub success: bool,
    pub payload: Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response carrying the handler's result.
    pub fn success(action: impl Into<String>, callback_id: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            callback_id: callback_id.into(),
            is_response: true,
            success: true,
            payload,
            error: None,
        }
    }

    /// Failure response carrying an error message.
    pub fn failure(
        action: impl Into<String>,
        callback_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            callback_id: callback_id.into(),
            is_response: true,
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Raw inbound envelope as it appears on the wire.
///
/// Fields are kept as loose JSON values so that type checks happen in the
/// decoder, where a wrong type is treated the same as an absent field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEnvelope {
    pub action: Value,
    pub payload: Value,
    pub callback_id: Value,
    pub is_response: Value,
    pub success: Value,
    pub error: Value,
}
