//! Host channel management.
//!
//! The host exposes its outbound primitive as a named object that may or may
//! not exist at any given moment. `HostChannels` is that namespace: the host
//! installs and removes transports by name, and the bridge looks its channel
//! up every time it sends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::common::error::TransportError;

/// One-way, fire-and-forget string delivery to the host.
pub trait Transport: Send + Sync {
    fn post_message(&self, message: &str) -> Result<(), TransportError>;
}

impl Transport for mpsc::UnboundedSender<String> {
    fn post_message(&self, message: &str) -> Result<(), TransportError> {
        self.send(message.to_string())
            .map_err(|_| TransportError::Closed)
    }
}

/// Shared table of named host transports.
///
/// Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct HostChannels {
    channels: Arc<RwLock<HashMap<String, Arc<dyn Transport>>>>,
}

impl HostChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the transport under `name`.
    pub fn install(&self, name: impl Into<String>, transport: impl Transport + 'static) {
        self.channels.write().insert(name.into(), Arc::new(transport));
    }

    /// Install a channel-backed transport and return the receiving end.
    ///
    /// The receiver yields every envelope the bridge posts on this channel.
    pub fn install_channel(&self, name: impl Into<String>) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.install(name, tx);
        rx
    }

    /// Remove the transport under `name`, returning whether one was installed.
    pub fn remove(&self, name: &str) -> bool {
        self.channels.write().remove(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.channels.read().get(name).cloned()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }
}

impl std::fmt::Debug for HostChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("HostChannels").field("channels", &names).finish()
    }
}

/// The bridge's view of its host channel: a name, re-resolved on every use.
#[derive(Clone, Debug)]
pub struct BridgeChannel {
    host: HostChannels,
    name: Arc<RwLock<String>>,
}

impl BridgeChannel {
    pub fn new(host: HostChannels, name: impl Into<String>) -> Self {
        Self {
            host,
            name: Arc::new(RwLock::new(name.into())),
        }
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn host(&self) -> &HostChannels {
        &self.host
    }

    /// The transport currently installed under this channel's name.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.host.lookup(&self.name.read())
    }

    pub fn is_available(&self) -> bool {
        self.host.is_available(&self.name.read())
    }
}
