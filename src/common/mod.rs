//! Common types shared across the bridge.

pub mod error;
pub mod logging;
pub mod messages;

pub use error::{BridgeError, BridgeResult, ConfigError, DispatchError, TransportError};
pub use logging::init_logging;
pub use messages::{RawEnvelope, RequestEnvelope, ResponseEnvelope};
