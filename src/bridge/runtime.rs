//! Tokio runtime lookup for entry points the host may call from its own
//! threads (WebView callbacks, UI thread).

use tokio::runtime::Handle;

/// Runtime used to run timers and handlers.
///
/// Prefers the caller's runtime and falls back to the one captured when the
/// bridge was built.
#[derive(Clone, Debug, Default)]
pub struct RuntimeHandle {
    fallback: Option<Handle>,
}

impl RuntimeHandle {
    /// Capture the current runtime, if any.
    pub fn capture() -> Self {
        Self {
            fallback: Handle::try_current().ok(),
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            fallback: Some(handle),
        }
    }

    pub fn get(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.fallback.clone())
    }
}
