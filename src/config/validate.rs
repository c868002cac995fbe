//! Configuration validation.

use crate::common::error::ConfigError;
use crate::config::types::BridgeConfig;

/// Validate a configuration, reporting every problem at once.
pub fn validate_config(config: &BridgeConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.channel_name.trim().is_empty() {
        errors.push("channel_name is required".to_string());
    }
    if config.call_timeout_ms == 0 {
        errors.push("call_timeout_ms must be non-zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
