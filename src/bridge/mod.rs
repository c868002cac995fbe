//! The page-side bridge: outbound calls, readiness gating, inbound dispatch.
//!
//! ## Module Structure
//!
//! - `channels`: Host transport lookup (`HostChannels`, `Transport`)
//! - `dispatcher`: Inbound envelope routing
//! - `handlers`: Action handler registry
//! - `orchestrator`: Public `Bridge` facade
//! - `pending`: In-flight outbound call table
//! - `runtime`: Tokio runtime lookup for host threads
//! - `state`: Readiness gate

pub mod channels;
pub mod dispatcher;
pub mod handlers;
pub mod orchestrator;
pub mod pending;
pub mod runtime;
pub mod state;

pub use channels::{BridgeChannel, HostChannels, Transport};
pub use dispatcher::Dispatcher;
pub use handlers::{sync_handler, typed_handler, Handler, HandlerFuture, HandlerRegistry};
pub use orchestrator::{Bridge, PendingReply};
pub use pending::{CallResult, PendingCalls};
pub use runtime::RuntimeHandle;
pub use state::ReadinessGate;
