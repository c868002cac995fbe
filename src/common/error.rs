//! Error types for the bridge.

use thiserror::Error;

/// Failure of an outbound call, delivered through its reply future.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Channel \"{channel}\" is not available, cannot send action \"{action}\"")]
    ChannelUnavailable { channel: String, action: String },

    #[error("Timed out waiting for response to action \"{action}\" (callbackId: {callback_id})")]
    Timeout { action: String, callback_id: String },

    #[error("{message}")]
    RemoteFailure { action: String, message: String },

    #[error("Failed to post action \"{action}\" to channel \"{channel}\": {source}")]
    Transport {
        channel: String,
        action: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to encode action \"{action}\": {source}")]
    Encode {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode result of action \"{action}\": {source}")]
    Decode {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No Tokio runtime available to run action \"{action}\"")]
    NoRuntime { action: String },

    #[error("Call for action \"{action}\" was dropped before it settled")]
    Dropped { action: String },
}

impl BridgeError {
    /// Returns true if the call failed because no response arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Problems with an inbound envelope.
///
/// These never reach the host; the dispatcher logs them and drops the message,
/// except `NoHandler`, whose message is sent back to the remote caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Message has no valid action")]
    MissingAction,

    #[error("Response for action \"{action}\" has no valid callbackId")]
    MissingCallbackId { action: String },

    #[error("Response for unknown or already settled callbackId: {callback_id}")]
    UnknownCallback { callback_id: String },

    #[error("No handler registered for action \"{action}\"")]
    NoHandler { action: String },
}

/// Errors raised by a transport's post primitive.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport rejected message: {message}")]
    Rejected { message: String },
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Result type for outbound calls.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Result type alias for inbound dispatch.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
