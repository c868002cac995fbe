//! Bridge orchestrator that ties the page and its host together.
//!
//! `Bridge` is the public surface handed to the embedding application. It
//! owns the handler registry, the in-flight call table and the readiness
//! gate, and resolves its host channel by name on every send.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::channels::{BridgeChannel, HostChannels};
use super::dispatcher::Dispatcher;
use super::handlers::{Handler, HandlerRegistry};
use super::pending::{CallResult, PendingCalls, Settle};
use super::runtime::RuntimeHandle;
use super::state::{run_isolated, ReadinessGate};
use crate::common::error::{BridgeError, BridgeResult, ConfigError};
use crate::config::{self, BridgeConfig, DEFAULT_CHANNEL_NAME};

/// Bidirectional request/response bridge over a fire-and-forget host channel.
///
/// Cloning yields another handle to the same bridge.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

struct Inner {
    channel: BridgeChannel,
    call_timeout: Duration,
    handlers: Arc<HandlerRegistry>,
    pending: PendingCalls,
    gate: ReadinessGate,
    dispatcher: Dispatcher,
    runtime: RuntimeHandle,
}

impl Bridge {
    /// Create a bridge that looks up its transport in `host`.
    ///
    /// The current Tokio runtime, if any, is captured for host calls that
    /// arrive on threads outside it.
    pub fn new(config: BridgeConfig, host: HostChannels) -> Self {
        Self::build(config, host, RuntimeHandle::capture())
    }

    /// Create a bridge whose timers and handlers run on `runtime` whenever the
    /// caller is not already on a Tokio runtime.
    pub fn with_runtime(config: BridgeConfig, host: HostChannels, runtime: Handle) -> Self {
        Self::build(config, host, RuntimeHandle::from_handle(runtime))
    }

    fn build(config: BridgeConfig, host: HostChannels, runtime: RuntimeHandle) -> Self {
        let channel = BridgeChannel::new(host, config.channel_name.clone());
        let handlers = Arc::new(HandlerRegistry::new());
        let pending = PendingCalls::new();
        let dispatcher = Dispatcher::new(
            channel.clone(),
            handlers.clone(),
            pending.clone(),
            runtime.clone(),
        );

        info!(
            "Bridge created on channel \"{}\" (call timeout {:?})",
            config.channel_name,
            config.call_timeout()
        );

        Self {
            inner: Arc::new(Inner {
                channel,
                call_timeout: config.call_timeout(),
                handlers,
                pending,
                gate: ReadinessGate::new(),
                dispatcher,
                runtime,
            }),
        }
    }

    /// Bridge with the default configuration.
    pub fn with_host(host: HostChannels) -> Self {
        Self::new(BridgeConfig::default(), host)
    }

    /// Bridge configured from `WEBVIEW_BRIDGE_*` environment variables.
    pub fn from_env(host: HostChannels) -> Result<Self, ConfigError> {
        Ok(Self::new(config::from_env()?, host))
    }

    /// Set the name the host transport is looked up under.
    ///
    /// `None` or an empty name restores the default. Can be called any number
    /// of times; the last call wins.
    pub fn init(&self, channel_name: Option<&str>) {
        let name = channel_name
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CHANNEL_NAME);
        self.inner.channel.set_name(name);
        info!("Bridge initialized on channel \"{}\"", name);
    }

    /// Register the handler for requests with this action name, replacing any
    /// previous one.
    pub fn register_handler(&self, action: impl Into<String>, handler: impl Handler) {
        let action = action.into();
        info!("Registering handler for action \"{}\"", action);
        if self.inner.handlers.register(action.clone(), handler) {
            warn!("Replaced existing handler for action \"{}\"", action);
        }
    }

    /// Remove the handler for `action`, returning whether one was registered.
    pub fn unregister_handler(&self, action: &str) -> bool {
        self.inner.handlers.unregister(action)
    }

    pub fn has_handler(&self, action: &str) -> bool {
        self.inner.handlers.contains(action)
    }

    /// Send `action` to the host and get a future for its result.
    ///
    /// The send happens (or is queued until the host is ready) when this is
    /// called, not when the reply is first polled. Failures, including an
    /// unavailable channel, are reported through the reply. Needs a Tokio
    /// runtime, either the caller's or the one the bridge was built with.
    pub fn send_message(&self, action: &str, payload: Option<Value>) -> PendingReply {
        let (settle, rx) = oneshot::channel();
        let reply = PendingReply {
            action: action.to_string(),
            rx,
        };

        if !self.inner.channel.is_available() {
            let channel = self.inner.channel.name();
            error!(
                "Channel \"{}\" is not available, cannot send action \"{}\"",
                channel, action
            );
            let _ = settle.send(Err(BridgeError::ChannelUnavailable {
                channel,
                action: action.to_string(),
            }));
            return reply;
        }

        let Some(runtime) = self.inner.runtime.get() else {
            error!("No Tokio runtime available, cannot send action \"{}\"", action);
            let _ = settle.send(Err(BridgeError::NoRuntime {
                action: action.to_string(),
            }));
            return reply;
        };

        if self.inner.gate.is_signalled() {
            self.inner.start_call(&runtime, action, payload.as_ref(), settle);
            return reply;
        }

        warn!("Host is not ready yet, queueing action \"{}\"", action);
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let action = action.to_string();
        self.inner.gate.enqueue_or_pass(Box::new(move || {
            // A dropped bridge drops `settle`, which the reply reports.
            if let Some(inner) = inner.upgrade() {
                inner.start_call(&runtime, &action, payload.as_ref(), settle);
            }
        }));
        reply
    }

    /// Send `action` and decode its result into `T`.
    pub async fn call<T: DeserializeOwned>(&self, action: &str, payload: Option<Value>) -> BridgeResult<T> {
        self.send_message(action, payload).decode().await
    }

    /// Entry point for raw messages delivered by the host.
    pub fn receive_message(&self, raw: &str) {
        self.inner.dispatcher.receive(raw);
    }

    /// Readiness signal from the host. Replays queued work once; later calls
    /// do nothing. May be called from any thread.
    pub fn flutter_sdk_ready(&self) {
        self.inner.gate.signal_ready();
    }

    /// True once the host has signalled readiness and its channel is
    /// currently installed.
    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_signalled() && self.inner.channel.is_available()
    }

    /// Run `callback` now if the bridge is ready, otherwise when the host
    /// signals readiness.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        if self.is_ready() {
            run_isolated(Box::new(callback));
            return;
        }
        if !self.inner.gate.enqueue(Box::new(callback)) {
            warn!(
                "Host already signalled ready but channel \"{}\" is unavailable; ready callback dropped",
                self.inner.channel.name()
            );
        }
    }

    pub fn channel_name(&self) -> String {
        self.inner.channel.name()
    }

    pub fn host(&self) -> &HostChannels {
        self.inner.channel.host()
    }

    /// Number of outbound calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Callback ids of outbound calls awaiting a response.
    pub fn pending_callback_ids(&self) -> Vec<String> {
        self.inner.pending.callback_ids()
    }
}

impl Inner {
    fn start_call(&self, runtime: &Handle, action: &str, payload: Option<&Value>, settle: Settle) {
        let channel = self.channel.name();
        let Some(transport) = self.channel.transport() else {
            error!(
                "Channel \"{}\" is not available, cannot send action \"{}\"",
                channel, action
            );
            let _ = settle.send(Err(BridgeError::ChannelUnavailable {
                channel,
                action: action.to_string(),
            }));
            return;
        };
        self.pending.call(
            runtime,
            transport.as_ref(),
            &channel,
            action,
            payload,
            self.call_timeout,
            settle,
        );
    }
}

/// Eventual result of [`Bridge::send_message`].
#[must_use = "the reply carries the call's result or failure"]
pub struct PendingReply {
    action: String,
    rx: oneshot::Receiver<CallResult>,
}

impl PendingReply {
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Wait for the result and decode it into `T`.
    pub async fn decode<T: DeserializeOwned>(self) -> BridgeResult<T> {
        let action = self.action.clone();
        let value = self.await?;
        serde_json::from_value(value).map_err(|source| BridgeError::Decode { action, source })
    }
}

impl Future for PendingReply {
    type Output = CallResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|settled| {
            settled.unwrap_or_else(|_| {
                Err(BridgeError::Dropped {
                    action: this.action.clone(),
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::handlers::sync_handler;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_test::{assert_pending, assert_ready};

    fn setup() -> (Bridge, mpsc::UnboundedReceiver<String>) {
        let host = HostChannels::new();
        let rx = host.install_channel("FlutterBridge");
        (Bridge::with_host(host), rx)
    }

    fn next_sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().expect("nothing sent")).unwrap()
    }

    fn respond(bridge: &Bridge, sent: &Value, payload: Value) {
        let response = json!({
            "action": sent["action"],
            "callbackId": sent["callbackId"],
            "isResponse": true,
            "success": true,
            "payload": payload,
        });
        bridge.receive_message(&response.to_string());
    }

    #[tokio::test]
    async fn test_send_before_ready_resolves_after_ready() {
        let (bridge, mut rx) = setup();

        let reply = bridge.send_message("getUser", Some(json!({"id": 1})));
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.pending_count(), 0);

        bridge.flutter_sdk_ready();
        let sent = next_sent(&mut rx);
        assert_eq!(sent["action"], "getUser");
        assert_eq!(sent["payload"], json!({"id": 1}));

        let inbound = format!(
            r#"{{"action":"getUser","callbackId":"{}","isResponse":true,"success":true,"payload":{{"name":"A"}}}}"#,
            sent["callbackId"].as_str().unwrap()
        );
        bridge.receive_message(&inbound);
        assert_eq!(reply.await.unwrap(), json!({"name": "A"}));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_queued_sends_replay_in_order() {
        let (bridge, mut rx) = setup();
        let replies: Vec<PendingReply> = (0..5)
            .map(|i| bridge.send_message(&format!("action{}", i), Some(json!(i))))
            .collect();

        bridge.flutter_sdk_ready();
        let sent: Vec<Value> = (0..5).map(|_| next_sent(&mut rx)).collect();
        for (i, message) in sent.iter().enumerate() {
            assert_eq!(message["action"], format!("action{}", i));
        }

        // Answer out of order; each reply still gets its own payload.
        for message in sent.iter().rev() {
            respond(&bridge, message, message["payload"].clone());
        }
        for (i, reply) in replies.into_iter().enumerate() {
            assert_eq!(reply.await.unwrap(), json!(i));
        }
    }

    #[tokio::test]
    async fn test_channel_unavailable_rejects_immediately() {
        let bridge = Bridge::with_host(HostChannels::new());
        bridge.flutter_sdk_ready();

        let mut reply = tokio_test::task::spawn(bridge.send_message("getUser", None));
        let result = assert_ready!(reply.poll());
        match result {
            Err(BridgeError::ChannelUnavailable { channel, action }) => {
                assert_eq!(channel, "FlutterBridge");
                assert_eq!(action, "getUser");
            }
            other => panic!("expected channel unavailable, got {:?}", other),
        }
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_unavailable_is_not_queued() {
        let bridge = Bridge::with_host(HostChannels::new());
        let reply = bridge.send_message("getUser", None);

        let mut rx = bridge.host().install_channel("FlutterBridge");
        bridge.flutter_sdk_ready();

        assert!(matches!(reply.await, Err(BridgeError::ChannelUnavailable { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_removed_before_replay() {
        let (bridge, _rx) = setup();
        let reply = bridge.send_message("getUser", None);

        bridge.host().remove("FlutterBridge");
        bridge.flutter_sdk_ready();

        assert!(matches!(reply.await, Err(BridgeError::ChannelUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_reply_pending_until_response() {
        let (bridge, mut rx) = setup();
        bridge.flutter_sdk_ready();

        let mut reply = tokio_test::task::spawn(bridge.send_message("ping", None));
        assert_pending!(reply.poll());

        let sent = next_sent(&mut rx);
        assert!(sent.get("payload").is_none());
        respond(&bridge, &sent, json!("pong"));

        assert!(reply.is_woken());
        assert_eq!(assert_ready!(reply.poll()).unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_rapid_sends_get_distinct_ids() {
        let (bridge, mut rx) = setup();
        bridge.flutter_sdk_ready();

        let _first = bridge.send_message("a", None);
        let _second = bridge.send_message("a", None);
        let first = next_sent(&mut rx);
        let second = next_sent(&mut rx);
        assert_ne!(first["callbackId"], second["callbackId"]);
        assert_eq!(bridge.pending_callback_ids().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_timeout() {
        let host = HostChannels::new();
        let mut rx = host.install_channel("FlutterBridge");
        let config = BridgeConfig::default().with_call_timeout(Duration::from_millis(500));
        let bridge = Bridge::new(config, host);
        bridge.flutter_sdk_ready();

        let started = tokio::time::Instant::now();
        let err = bridge.send_message("slow", None).await.unwrap_err();
        assert!(err.is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(600));

        // A late answer is ignored.
        let sent = next_sent(&mut rx);
        respond(&bridge, &sent, json!(1));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure() {
        let (bridge, mut rx) = setup();
        bridge.flutter_sdk_ready();
        let reply = bridge.send_message("save", None);

        let sent = next_sent(&mut rx);
        let response = json!({
            "action": "save",
            "callbackId": sent["callbackId"],
            "isResponse": true,
            "success": false,
            "error": "",
        });
        bridge.receive_message(&response.to_string());

        match reply.await {
            Err(BridgeError::RemoteFailure { message, .. }) => {
                assert_eq!(message, "Flutter action 'save' failed without specific error message.");
            }
            other => panic!("expected remote failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_init_switches_channel() {
        let host = HostChannels::new();
        let mut default_rx = host.install_channel("FlutterBridge");
        let mut custom_rx = host.install_channel("NativeHost");
        let bridge = Bridge::with_host(host);
        bridge.flutter_sdk_ready();

        bridge.init(Some("NativeHost"));
        assert_eq!(bridge.channel_name(), "NativeHost");
        let _reply = bridge.send_message("a", None);
        assert!(custom_rx.try_recv().is_ok());

        bridge.init(Some(""));
        assert_eq!(bridge.channel_name(), "FlutterBridge");
        bridge.init(None);
        let _reply = bridge.send_message("b", None);
        assert!(default_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_is_ready_tracks_channel_presence() {
        let (bridge, _rx) = setup();
        assert!(!bridge.is_ready());

        bridge.flutter_sdk_ready();
        assert!(bridge.is_ready());

        bridge.host().remove("FlutterBridge");
        assert!(!bridge.is_ready());

        let _rx = bridge.host().install_channel("FlutterBridge");
        assert!(bridge.is_ready());
    }

    #[tokio::test]
    async fn test_on_ready_runs_in_order_with_queued_sends() {
        let (bridge, mut rx) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _reply = bridge.send_message("first", None);
        {
            let log = log.clone();
            bridge.on_ready(move || log.lock().push("callback"));
        }
        assert!(log.lock().is_empty());

        bridge.flutter_sdk_ready();
        assert_eq!(*log.lock(), vec!["callback"]);
        assert_eq!(next_sent(&mut rx)["action"], "first");

        // Already ready: runs immediately.
        {
            let log = log.clone();
            bridge.on_ready(move || log.lock().push("immediate"));
        }
        assert_eq!(*log.lock(), vec!["callback", "immediate"]);
    }

    #[tokio::test]
    async fn test_on_ready_panic_is_contained() {
        let (bridge, _rx) = setup();
        let ran = Arc::new(Mutex::new(false));
        bridge.on_ready(|| panic!("bad ready callback"));
        {
            let ran = ran.clone();
            bridge.on_ready(move || *ran.lock() = true);
        }
        bridge.flutter_sdk_ready();
        assert!(*ran.lock());
    }

    #[tokio::test]
    async fn test_round_trip_between_two_bridges() {
        // Each side's outbound channel feeds the other side's inbound entry point.
        let page_host = HostChannels::new();
        let mut page_out = page_host.install_channel("FlutterBridge");
        let page = Bridge::with_host(page_host);

        let native_host = HostChannels::new();
        let mut native_out = native_host.install_channel("FlutterBridge");
        let native = Bridge::with_host(native_host);

        native.register_handler("add", sync_handler(|payload| {
            let a = payload["a"].as_i64().unwrap_or(0);
            let b = payload["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        }));
        page.flutter_sdk_ready();

        let reply = page.send_message("add", Some(json!({"a": 2, "b": 3})));
        native.receive_message(&page_out.recv().await.unwrap());
        page.receive_message(&native_out.recv().await.unwrap());

        assert_eq!(reply.await.unwrap(), json!(5));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    #[tokio::test]
    async fn test_typed_call() {
        let (bridge, mut rx) = setup();
        bridge.flutter_sdk_ready();

        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.call::<User>("getUser", Some(json!({"id": 1}))).await })
        };
        let sent = loop {
            if let Ok(raw) = rx.try_recv() {
                break serde_json::from_str::<Value>(&raw).unwrap();
            }
            tokio::task::yield_now().await;
        };
        respond(&bridge, &sent, json!({"name": "A"}));
        assert_eq!(
            call.await.unwrap().unwrap(),
            User {
                name: "A".to_string()
            }
        );

        let reply = bridge.send_message("getUser", None);
        let sent = next_sent(&mut rx);
        respond(&bridge, &sent, json!(42));
        assert!(matches!(reply.decode::<User>().await, Err(BridgeError::Decode { .. })));
    }

    #[test]
    fn test_from_env_uses_defaults_without_overrides() {
        if std::env::var("WEBVIEW_BRIDGE_CHANNEL").is_err() {
            let bridge = Bridge::from_env(HostChannels::new()).unwrap();
            assert_eq!(bridge.channel_name(), DEFAULT_CHANNEL_NAME);
        }
    }

    fn host_thread(f: impl FnOnce() + Send + 'static) {
        std::thread::spawn(f).join().unwrap();
    }

    #[test]
    fn test_ready_and_responses_from_host_thread() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let host = HostChannels::new();
        let mut rx = host.install_channel("FlutterBridge");
        let config = BridgeConfig::default().with_call_timeout(Duration::from_millis(200));
        let bridge = Bridge::with_runtime(config, host, rt.handle().clone());

        let unanswered = bridge.send_message("getUser", None);
        let answered = bridge.send_message("getUser", None);
        {
            let bridge = bridge.clone();
            host_thread(move || bridge.flutter_sdk_ready());
        }
        let _first = next_sent(&mut rx);
        let second = next_sent(&mut rx);
        assert_eq!(bridge.pending_count(), 2);

        {
            let bridge = bridge.clone();
            host_thread(move || respond(&bridge, &second, json!("ok")));
        }
        assert_eq!(rt.block_on(answered).unwrap(), json!("ok"));

        let err = rt.block_on(unanswered).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[test]
    fn test_send_without_runtime_fails() {
        let host = HostChannels::new();
        let mut rx = host.install_channel("FlutterBridge");
        let bridge = Bridge::with_host(host);
        bridge.flutter_sdk_ready();

        let result = futures::executor::block_on(bridge.send_message("getUser", None));
        assert!(matches!(result, Err(BridgeError::NoRuntime { .. })));
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_has_handler() {
        let (bridge, _rx) = setup();
        bridge.register_handler("ping", sync_handler(|_| Ok(json!("pong"))));
        assert!(bridge.has_handler("ping"));
        assert!(bridge.unregister_handler("ping"));
        assert!(!bridge.has_handler("ping"));
    }

    #[tokio::test]
    async fn test_dropped_bridge_reports_dropped() {
        let (bridge, _rx) = setup();
        let reply = bridge.send_message("getUser", None);
        drop(bridge);
        assert!(matches!(reply.await, Err(BridgeError::Dropped { .. })));
    }
}
