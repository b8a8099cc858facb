//! Consumer-side subscription handle
//!
//! A [`Subscription`] is what an application component holds. It owns one
//! binding and keeps a local view (status, last message, history) that the
//! engine fills through the binding's callbacks. Views are never shared:
//! two subscriptions on the same connection each see only what arrived while
//! they were attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::config::SocketConfig;
use crate::registry::{
    BindingId, ConnectionKey, ConnectionStatus, SocketRegistry, SubscriberCallbacks,
};

struct LocalView<M> {
    attached: AtomicBool,
    status: watch::Sender<ConnectionStatus>,
    last_message: Mutex<Option<Arc<M>>>,
    history: Mutex<Vec<Arc<M>>>,
}

// A panicking callback elsewhere must not wedge the view
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<M: Send + Sync + 'static> LocalView<M> {
    fn callbacks(self: &Arc<Self>) -> SubscriberCallbacks<M> {
        let status_view = Arc::clone(self);
        let last_view = Arc::clone(self);
        let history_view = Arc::clone(self);

        SubscriberCallbacks::new(
            move |status| {
                if status_view.is_attached() {
                    status_view.status.send_replace(status);
                }
            },
            move |message| {
                if last_view.is_attached() {
                    *lock(&last_view.last_message) = Some(message);
                }
            },
            move |message| {
                if history_view.is_attached() {
                    lock(&history_view.history).push(message);
                }
            },
        )
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

/// One consumer of a shared connection
///
/// Dropping the subscription detaches it, so a binding is never left behind
/// on the connection no matter how the owner goes away.
///
/// # Example
/// ```no_run
/// use serde_json::{json, Value};
/// use socket_share::{SocketConfig, SocketRegistry};
///
/// # async fn example() {
/// let registry = SocketRegistry::<Value>::websocket();
/// let feed = registry.subscribe("ws://localhost:8080/feed", SocketConfig::default());
///
/// feed.connect();
/// feed.send(json!({"type": "hello"}));
///
/// let mut status = feed.status_changes();
/// while status.changed().await.is_ok() {
///     println!("status: {}", *status.borrow());
/// }
/// # }
/// ```
pub struct Subscription<M: Send + Sync + 'static> {
    registry: SocketRegistry<M>,
    address: String,
    config: Arc<SocketConfig<M>>,
    key: ConnectionKey,
    binding: BindingId,
    callbacks: Arc<SubscriberCallbacks<M>>,
    view: Arc<LocalView<M>>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl<M: Send + Sync + 'static> Subscription<M> {
    pub(crate) fn new(
        registry: SocketRegistry<M>,
        address: String,
        config: SocketConfig<M>,
    ) -> Self {
        let key = ConnectionKey::derive(&address, &config);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let view = Arc::new(LocalView {
            attached: AtomicBool::new(false),
            status: status_tx,
            last_message: Mutex::new(None),
            history: Mutex::new(Vec::new()),
        });
        let callbacks = Arc::new(view.callbacks());

        Self {
            registry,
            address,
            config: Arc::new(config),
            key,
            binding: BindingId::next(),
            callbacks,
            view,
            status_rx,
        }
    }

    /// Attach (if needed) and make sure the connection is connecting or
    /// connected. Clears a previous kill.
    pub fn connect(&self) {
        self.view.attached.store(true, Ordering::Release);

        let key = self.registry.attach(
            &self.address,
            Arc::clone(&self.config),
            self.binding,
            Arc::clone(&self.callbacks),
        );
        debug_assert_eq!(key, self.key);
    }

    /// Detach; the last subscriber on a connection closes it
    ///
    /// Does nothing when not attached.
    pub fn disconnect(&self) {
        if !self.view.attached.swap(false, Ordering::AcqRel) {
            return;
        }

        self.view.status.send_replace(ConnectionStatus::Disconnected);
        self.registry.detach(&self.key, self.binding);
    }

    /// Send, queue or drop per the connection's state and config
    pub fn send(&self, message: M) {
        self.registry.send(&self.key, message);
    }

    /// Kill the shared connection for every subscriber of this key
    pub fn kill_all(&self) {
        self.registry.kill(&self.key);
    }

    pub fn is_attached(&self) -> bool {
        self.view.is_attached()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Receiver that wakes on every status change
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Most recent decoded message, if any arrived yet
    pub fn last_message(&self) -> Option<Arc<M>> {
        lock(&self.view.last_message).clone()
    }

    /// Every decoded message received while attached, oldest first
    pub fn history(&self) -> Vec<Arc<M>> {
        lock(&self.view.history).clone()
    }

    pub fn clear_history(&self) {
        lock(&self.view.history).clear();
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &SocketConfig<M> {
        &self.config
    }
}

impl<M: Send + Sync + 'static> Drop for Subscription<M> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<M: Send + Sync + 'static> std::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("binding", &self.binding)
            .field("attached", &self.is_attached())
            .field("status", &self.status())
            .finish()
    }
}
