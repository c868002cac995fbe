//! Configuration parsing (JSON format).

use crate::common::error::ConfigError;
use crate::config::types::BridgeConfig;

/// Load configuration from a JSON string. Missing fields take their defaults.
pub fn load_config_str(content: &str) -> Result<BridgeConfig, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
