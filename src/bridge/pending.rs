//! Outbound call tracking.
//!
//! Every call that expects a reply owns one entry in the in-flight table,
//! keyed by its callback id. An entry is settled by whoever removes it first:
//! the matching response or the timeout timer. Removal is the commit point, so
//! a call settles exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bridge::channels::Transport;
use crate::common::error::{BridgeError, BridgeResult};
use crate::protocol::envelope::{encode_request, InboundResponse};

/// Eventual outcome of an outbound call.
pub type CallResult = BridgeResult<Value>;

/// Settlement slot for one outbound call.
pub type Settle = oneshot::Sender<CallResult>;

struct PendingCall {
    action: String,
    settle: Settle,
    created_at: Instant,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    fn settle(self, result: CallResult) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have dropped its reply future; nothing to deliver then.
        let _ = self.settle.send(result);
    }
}

/// In-flight table of outbound calls.
///
/// Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct PendingCalls {
    calls: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `action` through `transport` and track it until it settles.
    ///
    /// The outcome is always delivered through `settle`, including immediate
    /// encode and post failures. The timeout timer runs on `runtime`, so this
    /// may be called from any thread.
    pub fn call(
        &self,
        runtime: &Handle,
        transport: &dyn Transport,
        channel: &str,
        action: &str,
        payload: Option<&Value>,
        timeout: Duration,
        settle: Settle,
    ) {
        let callback_id = self.register(runtime, action, timeout, settle);

        let message = match encode_request(action, payload, &callback_id) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to encode action \"{}\": {}", action, e);
                self.fail(
                    &callback_id,
                    BridgeError::Encode {
                        action: action.to_string(),
                        source: e,
                    },
                );
                return;
            }
        };

        debug!(channel, action, callback_id = %callback_id, "Sending {}", message);
        if let Err(e) = transport.post_message(&message) {
            error!("Failed to send action \"{}\" on channel \"{}\": {}", action, channel, e);
            self.fail(
                &callback_id,
                BridgeError::Transport {
                    channel: channel.to_string(),
                    action: action.to_string(),
                    source: e,
                },
            );
        }
    }

    /// Settle the call a response refers to.
    ///
    /// Returns `false` if no call with that id is pending (already timed out,
    /// already answered, or never issued).
    pub fn resolve_response(&self, response: InboundResponse) -> bool {
        let Some(call) = self.calls.lock().remove(&response.callback_id) else {
            warn!(
                "Received response for unknown or already settled callbackId: {}",
                response.callback_id
            );
            return false;
        };

        let elapsed = call.created_at.elapsed();
        if response.success {
            info!(
                "Received success response for action \"{}\" (callbackId: {}) after {:?}",
                call.action, response.callback_id, elapsed
            );
            call.settle(Ok(response.payload));
        } else {
            let message = response.error.unwrap_or_else(|| {
                format!(
                    "Flutter action '{}' failed without specific error message.",
                    response.action
                )
            });
            error!(
                "Received failure response for action \"{}\" (callbackId: {}): {}",
                call.action, response.callback_id, message
            );
            let action = call.action.clone();
            call.settle(Err(BridgeError::RemoteFailure { action, message }));
        }
        true
    }

    /// Number of calls awaiting a response.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Sorted callback ids of the calls awaiting a response.
    pub fn callback_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.calls.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Allocate a callback id unique among in-flight calls and insert the call
    /// with its timeout timer already armed.
    fn register(&self, runtime: &Handle, action: &str, timeout: Duration, settle: Settle) -> String {
        let mut calls = self.calls.lock();
        let callback_id = loop {
            let candidate = new_callback_id();
            if !calls.contains_key(&candidate) {
                break candidate;
            }
        };

        // The entry is inserted before the lock is released, so the timer
        // cannot expire a call it does not find.
        let timer = {
            let calls = self.clone();
            let id = callback_id.clone();
            runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                calls.expire(&id);
            })
        };

        calls.insert(
            callback_id.clone(),
            PendingCall {
                action: action.to_string(),
                settle,
                created_at: Instant::now(),
                timer: Some(timer.abort_handle()),
            },
        );
        callback_id
    }

    fn fail(&self, callback_id: &str, err: BridgeError) {
        let call = self.calls.lock().remove(callback_id);
        if let Some(call) = call {
            call.settle(Err(err));
        }
    }

    fn expire(&self, callback_id: &str) {
        let call = self.calls.lock().remove(callback_id);
        if let Some(mut call) = call {
            error!(
                "Timed out waiting for response to action \"{}\" (callbackId: {})",
                call.action, callback_id
            );
            // This task is the timer; don't abort ourselves.
            call.timer = None;
            let action = call.action.clone();
            call.settle(Err(BridgeError::Timeout {
                action,
                callback_id: callback_id.to_string(),
            }));
        }
    }
}

/// Time-based prefix plus a random suffix, so ids stay distinct even when
/// issued within the same millisecond.
fn new_callback_id() -> String {
    format!("{}_{:x}", Utc::now().timestamp_millis(), rand::random::<u64>())
}
