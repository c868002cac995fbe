//! Configuration type definitions.

use std::time::Duration;

use serde::Deserialize;

/// Channel name used when none is configured.
pub const DEFAULT_CHANNEL_NAME: &str = "FlutterBridge";

/// Default deadline for an outbound call, in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name under which the host installs its transport.
    pub channel_name: String,
    /// How long an outbound call waits for its response.
    pub call_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}
