//! Logging setup for embedding applications.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber filtered by `RUST_LOG`, falling
/// back to `info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .is_ok()
}
