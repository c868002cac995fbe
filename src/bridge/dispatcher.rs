//! Inbound message dispatch.
//!
//! Decodes raw envelopes from the host, completes pending outbound calls with
//! responses, and runs registered handlers for requests. Nothing that goes
//! wrong here propagates to the host: bad messages are logged and dropped,
//! handler failures become failure responses.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture};
use futures::task::noop_waker;
use futures::FutureExt;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::channels::BridgeChannel;
use super::handlers::{Handler, HandlerRegistry};
use super::pending::PendingCalls;
use super::runtime::RuntimeHandle;
use super::state::panic_message;
use crate::common::error::DispatchError;
use crate::common::messages::ResponseEnvelope;
use crate::protocol::envelope::{decode, encode_response, Inbound, InboundRequest};

/// Handler result, with errors and panics already rendered as text.
type HandlerOutcome = Result<Value, String>;

/// Routes inbound envelopes to pending calls or handlers.
#[derive(Clone)]
pub struct Dispatcher {
    channel: BridgeChannel,
    handlers: Arc<HandlerRegistry>,
    pending: PendingCalls,
    runtime: RuntimeHandle,
}

impl Dispatcher {
    pub fn new(
        channel: BridgeChannel,
        handlers: Arc<HandlerRegistry>,
        pending: PendingCalls,
        runtime: RuntimeHandle,
    ) -> Self {
        Self {
            channel,
            handlers,
            pending,
            runtime,
        }
    }

    /// Handle one raw message from the host.
    ///
    /// A request's handler is started before this returns, so handlers start
    /// in the order their requests were received. Handlers that suspend finish
    /// on the runtime; any thread may call this.
    pub fn receive(&self, raw: &str) {
        debug!("Received message: {}", raw);

        let inbound = match decode(raw) {
            Ok(inbound) => inbound,
            Err(e @ DispatchError::MissingCallbackId { .. }) => {
                warn!("Dropping response: {}: {}", e, raw);
                return;
            }
            Err(e) => {
                error!("Dropping message: {}: {}", e, raw);
                return;
            }
        };
        debug!(action = inbound.action(), "Routing inbound message");

        match inbound {
            Inbound::Response(response) => {
                self.pending.resolve_response(response);
            }
            Inbound::Request(request) => self.dispatch_request(request),
        }
    }

    fn dispatch_request(&self, request: InboundRequest) {
        let InboundRequest {
            action,
            payload,
            callback_id,
        } = request;
        info!("Handling request for action \"{}\"", action);

        let Some(handler) = self.handlers.get(&action) else {
            let err = DispatchError::NoHandler {
                action: action.clone(),
            };
            warn!("{}", err);
            if let Some(callback_id) = callback_id {
                post_response(
                    &self.channel,
                    &ResponseEnvelope::failure(action, callback_id, err.to_string()),
                );
            }
            return;
        };

        // Run the handler up to its first suspension point here; only the rest
        // is left to the scheduler.
        let runtime = self.runtime.get();
        let (running, first_poll) = {
            let _entered = runtime.as_ref().map(Handle::enter);
            let mut running = start_handler(handler.as_ref(), &action, payload);
            let waker = noop_waker();
            let first_poll = running.poll_unpin(&mut Context::from_waker(&waker));
            (running, first_poll)
        };
        if let Poll::Ready(outcome) = first_poll {
            finish_request(&self.channel, action, callback_id, outcome);
            return;
        }

        let Some(runtime) = runtime else {
            let message = format!("No Tokio runtime to finish handler for action \"{}\"", action);
            finish_request(&self.channel, action, callback_id, Err(message));
            return;
        };
        let channel = self.channel.clone();
        runtime.spawn(async move {
            let outcome = running.await;
            finish_request(&channel, action, callback_id, outcome);
        });
    }
}

/// Call a handler, folding errors and panics (at call time or while polled)
/// into one message.
fn start_handler(handler: &dyn Handler, action: &str, payload: Value) -> BoxFuture<'static, HandlerOutcome> {
    let panicked = {
        let action = action.to_string();
        move |panic: Box<dyn Any + Send>| {
            format!(
                "Handler for action \"{}\" panicked: {}",
                action,
                panic_message(panic.as_ref())
            )
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(payload))) {
        Ok(running) => AssertUnwindSafe(running)
            .catch_unwind()
            .map(move |outcome| match outcome {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(panic) => Err(panicked(panic)),
            })
            .boxed(),
        Err(panic) => future::ready(Err(panicked(panic))).boxed(),
    }
}

/// Reply to the remote caller, if it expects a reply.
fn finish_request(channel: &BridgeChannel, action: String, callback_id: Option<String>, outcome: HandlerOutcome) {
    match (outcome, callback_id) {
        (Ok(result), Some(callback_id)) => {
            debug!(action = %action, callback_id = %callback_id, "Handler succeeded, sending result");
            post_response(channel, &ResponseEnvelope::success(action, callback_id, result));
        }
        (Ok(_), None) => {
            debug!(action = %action, "Handler succeeded, no reply expected");
        }
        (Err(message), Some(callback_id)) => {
            error!("Handler for action \"{}\" failed: {}", action, message);
            post_response(channel, &ResponseEnvelope::failure(action, callback_id, message));
        }
        (Err(message), None) => {
            error!("Handler for action \"{}\" failed: {}", action, message);
        }
    }
}

/// Post a response envelope through the channel's current transport.
fn post_response(channel: &BridgeChannel, response: &ResponseEnvelope) {
    let Some(transport) = channel.transport() else {
        error!(
            "Cannot send response for action \"{}\": channel \"{}\" is not available",
            response.action,
            channel.name()
        );
        return;
    };

    let message = match encode_response(response) {
        Ok(message) => message,
        Err(e) => {
            error!("Failed to encode response for action \"{}\": {}", response.action, e);
            return;
        }
    };

    debug!("Sending response: {}", message);
    if let Err(e) = transport.post_message(&message) {
        error!("Failed to send response for action \"{}\": {}", response.action, e);
    }
}
