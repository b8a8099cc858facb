//! Connection registry handle
//!
//! The public face of the engine. Every method enqueues a command and returns
//! immediately; reads wait for their reply, which comes after everything
//! enqueued before them has been applied.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::SocketConfig;
use crate::subscription::Subscription;
use crate::timer::{Scheduler, TokioScheduler};
use crate::transport::{Connector, WsConnector};

use super::binding::{BindingId, SubscriberCallbacks};
use super::engine::{Command, Engine};
use super::entry::ConnectionInfo;
use super::key::ConnectionKey;

struct RegistryInner<M> {
    commands: mpsc::UnboundedSender<Command<M>>,
}

impl<M> Drop for RegistryInner<M> {
    fn drop(&mut self) {
        // Last handle gone: stop the engine task
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Registry of shared connections
///
/// Cheap to clone; all clones talk to the same engine task. Construct one per
/// application (or per test) and hand it to every consumer.
pub struct SocketRegistry<M> {
    inner: Arc<RegistryInner<M>>,
}

impl<M> Clone for SocketRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> std::fmt::Debug for SocketRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("running", &!self.inner.commands.is_closed())
            .finish()
    }
}

impl<M: Send + Sync + 'static> SocketRegistry<M> {
    /// Create a registry over WebSocket transports
    ///
    /// Must be called from within a tokio runtime.
    pub fn websocket() -> Self {
        Self::new(Arc::new(WsConnector))
    }

    /// Create a registry over the given connector, with tokio timers
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_scheduler(connector, Arc::new(TokioScheduler))
    }

    /// Create a registry with explicit collaborators
    ///
    /// Spawns the engine task; must be called from within a tokio runtime.
    pub fn with_scheduler(connector: Arc<dyn Connector>, scheduler: Arc<dyn Scheduler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(connector, scheduler, tx.clone());

        tokio::spawn(engine.run(rx));
        tracing::debug!("Connection registry started");

        Self {
            inner: Arc::new(RegistryInner { commands: tx }),
        }
    }

    /// Create a consumer handle for `address` under `config`
    ///
    /// Nothing is opened until [`Subscription::connect`] is called.
    pub fn subscribe(
        &self,
        address: impl Into<String>,
        config: SocketConfig<M>,
    ) -> Subscription<M> {
        Subscription::new(self.clone(), address.into(), config)
    }

    /// Attach a binding to the connection for `address`/`config` and make
    /// sure it is connecting or connected
    ///
    /// Returns the key the binding was attached under. Attaching an already
    /// attached binding only re-asserts the connect intent.
    pub fn attach(
        &self,
        address: &str,
        config: Arc<SocketConfig<M>>,
        binding: BindingId,
        callbacks: Arc<SubscriberCallbacks<M>>,
    ) -> ConnectionKey {
        let key = ConnectionKey::derive(address, &config);
        self.dispatch(Command::Connect {
            key: key.clone(),
            address: address.to_owned(),
            config,
            binding,
            callbacks,
        });
        key
    }

    /// Detach a binding; the last detach closes and removes the connection
    ///
    /// Detaching a binding that is not attached does nothing.
    pub fn detach(&self, key: &ConnectionKey, binding: BindingId) {
        self.dispatch(Command::Disconnect {
            key: key.clone(),
            binding,
        });
    }

    /// Send now if open, otherwise queue or drop per the connection's config
    pub fn send(&self, key: &ConnectionKey, message: M) {
        self.dispatch(Command::Send {
            key: key.clone(),
            message,
        });
    }

    /// Force the connection closed and suppress reconnects until the next
    /// connect. Affects every subscriber of `key`.
    pub fn kill(&self, key: &ConnectionKey) {
        self.dispatch(Command::Kill { key: key.clone() });
    }

    /// Drop every queued outgoing message of `key`
    pub fn clear_queue(&self, key: &ConnectionKey) {
        self.dispatch(Command::ClearQueue { key: key.clone() });
    }

    /// Live view of every connection, sorted by key
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::Snapshot { reply });
        rx.await.unwrap_or_default()
    }

    /// Live view of one connection
    pub async fn connection_info(&self, key: &ConnectionKey) -> Option<ConnectionInfo> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::Info {
            key: key.clone(),
            reply,
        });
        rx.await.ok().flatten()
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.snapshot().await.len()
    }

    /// Close every connection and stop the engine
    ///
    /// Later operations on any clone are ignored.
    pub fn shutdown(&self) {
        self.dispatch(Command::Shutdown);
    }

    fn dispatch(&self, command: Command<M>) {
        if self.inner.commands.send(command).is_err() {
            tracing::debug!("Connection registry stopped, command dropped");
        }
    }
}
