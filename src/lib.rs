//! webview-bridge - request/response correlation over a WebView message channel.
//!
//! The host embedding a web page only offers a one-way string post in each
//! direction. This crate builds named calls with asynchronous results on top
//! of it: outbound calls are tagged with callback ids and matched to their
//! responses, inbound requests are dispatched to registered handlers, and
//! calls made before the host signals readiness are queued and replayed in
//! order.
//!
//! ```ignore
//! let host = HostChannels::new();
//! let mut outbound = host.install_channel("FlutterBridge");
//! let bridge = Bridge::with_host(host);
//!
//! bridge.register_handler("ping", sync_handler(|_| Ok(json!("pong"))));
//! let reply = bridge.send_message("getUser", Some(json!({"id": 1})));
//! bridge.flutter_sdk_ready();
//! ```

pub mod bridge;
pub mod common;
pub mod config;
pub mod protocol;

pub use bridge::{
    sync_handler, typed_handler, Bridge, Handler, HostChannels, PendingReply, Transport,
};
pub use common::{init_logging, BridgeError, BridgeResult, ConfigError, TransportError};
pub use config::BridgeConfig;
