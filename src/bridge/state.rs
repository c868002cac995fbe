//! Readiness gate.
//!
//! Work submitted before the host signals readiness is held in a FIFO queue
//! and replayed exactly once, in submission order, on the first
//! `signal_ready()`. The gate never closes again afterwards.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{debug, error, info};

/// Deferred unit of work run when the gate opens.
pub type ReadyThunk = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct GateState {
    ready: bool,
    queue: VecDeque<ReadyThunk>,
}

/// One-shot readiness gate with an ordered replay queue.
#[derive(Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `thunk` now if the gate is open, otherwise queue it.
    pub fn enqueue_or_pass(&self, thunk: ReadyThunk) {
        {
            let mut state = self.state.lock();
            if !state.ready {
                state.queue.push_back(thunk);
                debug!(queued = state.queue.len(), "Queued work until ready");
                return;
            }
        }
        run_isolated(thunk);
    }

    /// Queue `thunk` for the readiness transition without running it now.
    ///
    /// Returns `false` (and drops the thunk) if the gate already opened, since
    /// the queue will never be drained again.
    pub fn enqueue(&self, thunk: ReadyThunk) -> bool {
        let mut state = self.state.lock();
        if state.ready {
            return false;
        }
        state.queue.push_back(thunk);
        true
    }

    /// Open the gate and replay queued work. Later calls are no-ops.
    pub fn signal_ready(&self) {
        let queued = {
            let mut state = self.state.lock();
            if state.ready {
                return;
            }
            state.ready = true;
            std::mem::take(&mut state.queue)
        };

        info!("Host signalled ready, replaying {} queued operation(s)", queued.len());
        for thunk in queued {
            run_isolated(thunk);
        }
    }

    /// Whether `signal_ready()` has been called.
    pub fn is_signalled(&self) -> bool {
        self.state.lock().ready
    }
}

/// Run a thunk, logging instead of propagating a panic.
pub(crate) fn run_isolated(thunk: ReadyThunk) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(thunk)) {
        error!("Error in ready callback: {}", panic_message(panic.as_ref()));
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
