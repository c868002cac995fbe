//! Environment variable overrides for configuration.
//!
//! - `WEBVIEW_BRIDGE_CHANNEL` - transport channel name
//! - `WEBVIEW_BRIDGE_TIMEOUT_MS` - outbound call timeout in milliseconds

use std::env;

use tracing::warn;

use crate::config::types::BridgeConfig;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "WEBVIEW_BRIDGE";

/// Apply environment variable overrides to a config.
pub fn apply_env_overrides(config: BridgeConfig) -> BridgeConfig {
    apply_overrides(config, |key| env::var(key).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
fn apply_overrides(mut config: BridgeConfig, lookup: impl Fn(&str) -> Option<String>) -> BridgeConfig {
    if let Some(channel) = lookup(&format!("{}_CHANNEL", ENV_PREFIX)) {
        config.channel_name = channel;
    }

    let timeout_var = format!("{}_TIMEOUT_MS", ENV_PREFIX);
    if let Some(timeout) = lookup(&timeout_var) {
        match timeout.parse() {
            Ok(ms) => config.call_timeout_ms = ms,
            Err(e) => warn!("Ignoring {}='{}': {}", timeout_var, timeout, e),
        }
    }

    config
}
