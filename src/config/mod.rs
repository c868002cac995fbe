//! Configuration parsing, environment overrides and validation.

pub mod env;
pub mod parser;
pub mod types;
pub mod validate;

pub use parser::load_config_str;
pub use types::*;
pub use validate::validate_config;

use crate::common::error::ConfigError;

/// Parse a JSON config, apply environment overrides and validate the result.
pub fn load_and_validate_str(content: &str) -> Result<BridgeConfig, ConfigError> {
    let config = env::apply_env_overrides(load_config_str(content)?);
    validate_config(&config)?;
    Ok(config)
}

/// Default config with environment overrides applied, validated.
pub fn from_env() -> Result<BridgeConfig, ConfigError> {
    let config = env::apply_env_overrides(BridgeConfig::default());
    validate_config(&config)?;
    Ok(config)
}
