//! Handler registry for inbound requests.
//!
//! One handler per action name; registering again replaces the previous one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Eventual result of a handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Handles the payload of an inbound request.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, payload: Value) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn handle(&self, payload: Value) -> HandlerFuture {
        self(payload).boxed()
    }
}

/// Adapt a synchronous closure into a handler.
pub fn sync_handler<F>(f: F) -> impl Handler
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    move |payload: Value| future::ready(f(payload))
}

/// Adapt an async closure over typed payloads into a handler.
///
/// The payload is deserialized into `T` before the closure runs; a payload of
/// the wrong shape fails the request without calling it.
pub fn typed_handler<T, R, F, Fut>(f: F) -> impl Handler
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let f = Arc::new(f);
    move |payload: Value| {
        let f = f.clone();
        async move {
            let input: T = serde_json::from_value(payload).context("invalid payload")?;
            let output = f(input).await?;
            serde_json::to_value(output).context("failed to encode result")
        }
    }
}

/// Action name to handler mapping.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `action`, returning true if it replaced one.
    pub fn register(&self, action: impl Into<String>, handler: impl Handler) -> bool {
        self.handlers
            .write()
            .insert(action.into(), Arc::new(handler))
            .is_some()
    }

    /// Remove the handler for `action`, returning whether one was registered.
    pub fn unregister(&self, action: &str) -> bool {
        self.handlers.write().remove(action).is_some()
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(action).cloned()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.read().contains_key(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = HandlerRegistry::new();
        assert!(!registry.register("ping", sync_handler(|_| Ok(json!("first")))));
        assert!(registry.register("ping", sync_handler(|_| Ok(json!("second")))));

        let handler = registry.get("ping").unwrap();
        assert_eq!(handler.handle(Value::Null).await.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_async_closure_handler() {
        let registry = HandlerRegistry::new();
        registry.register("double", |payload: Value| async move {
            let n = payload.as_i64().context("expected a number")?;
            Ok::<_, anyhow::Error>(json!(n * 2))
        });

        let handler = registry.get("double").unwrap();
        assert_eq!(handler.handle(json!(21)).await.unwrap(), json!(42));
        let err = handler.handle(json!("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "expected a number");
    }

    #[test]
    fn test_unregister() {
        let registry = HandlerRegistry::new();
        registry.register("ping", sync_handler(|_| Ok(Value::Null)));
        assert!(registry.contains("ping"));
        assert!(registry.unregister("ping"));
        assert!(!registry.unregister("ping"));
        assert!(!registry.contains("ping"));
    }

    #[derive(Deserialize)]
    struct GetUser {
        id: u32,
    }

    #[derive(Serialize)]
    struct User {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn test_typed_handler_validates_payload() {
        let handler = typed_handler(|req: GetUser| async move {
            Ok::<_, anyhow::Error>(User {
                id: req.id,
                name: "A".to_string(),
            })
        });

        let result = handler.handle(json!({"id": 1})).await.unwrap();
        assert_eq!(result, json!({"id": 1, "name": "A"}));

        let err = handler.handle(json!({"id": "one"})).await.unwrap_err();
        assert!(err.to_string().contains("invalid payload"));
    }
}
