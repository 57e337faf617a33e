// ── Callback registry ──
//
// Handlers are keyed by `MessageKind`; registering again for the same kind
// replaces the previous handler. Synchronous closures and closures that
// return a future share one shape: every handler yields a boxed future, and
// synchronous ones return an already-completed one.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use super::messages::WebsocketMessage;
use super::types::MessageKind;

/// A frame the codec rejected, handed to the invalid-message handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFrame {
    /// The frame exactly as received.
    pub raw: String,
    /// Rendered decode error.
    pub reason: String,
}

// ── Handler ──────────────────────────────────────────────────────────

/// A registered callback for messages of type `T`.
pub struct Handler<T> {
    call: Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>,
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
        }
    }
}

impl<T> std::fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Handler<T> {
    /// Wrap a plain closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            call: Arc::new(move |message| {
                f(message);
                future::ready(()).boxed()
            }),
        }
    }

    /// Wrap a closure returning a future; the dispatcher awaits it.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            call: Arc::new(move |message| f(message).boxed()),
        }
    }

    /// Run the handler to completion. A panicking handler is logged and
    /// swallowed so dispatch can continue.
    pub async fn invoke(&self, message: T) {
        let call = Arc::clone(&self.call);
        let outcome = AssertUnwindSafe(async move { call(message).await })
            .catch_unwind()
            .await;
        if outcome.is_err() {
            tracing::warn!("message handler panicked");
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Registry {
    handlers: DashMap<MessageKind, Handler<WebsocketMessage>>,
    invalid: Mutex<Option<Handler<InvalidFrame>>>,
}

impl Registry {
    /// Install `handler` for `kind`, returning the one it replaced.
    pub(crate) fn register(
        &self,
        kind: MessageKind,
        handler: Handler<WebsocketMessage>,
    ) -> Option<Handler<WebsocketMessage>> {
        self.handlers.insert(kind, handler)
    }

    pub(crate) fn unregister(&self, kind: MessageKind) -> Option<Handler<WebsocketMessage>> {
        self.handlers.remove(&kind).map(|(_, handler)| handler)
    }

    /// Clone of the current handler. The map guard is released before the
    /// caller awaits anything.
    pub(crate) fn get(&self, kind: MessageKind) -> Option<Handler<WebsocketMessage>> {
        self.handlers.get(&kind).map(|entry| entry.value().clone())
    }

    pub(crate) fn set_invalid(&self, handler: Handler<InvalidFrame>) {
        *self.invalid.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn invalid(&self) -> Option<Handler<InvalidFrame>> {
        self.invalid
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
