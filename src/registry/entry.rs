//! Connection entry and status types
//!
//! This module defines the per-connection state stored in the registry.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::SocketConfig;
use crate::timer::TimerHandle;
use crate::transport::Transport;

use super::binding::{AttachedBinding, BindingId, SubscriberCallbacks};
use super::key::ConnectionKey;

/// Lifecycle status of a shared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No transport and nothing pending
    #[default]
    Disconnected,
    /// Transport opening
    Connecting,
    /// Transport open
    Connected,
    /// Waiting for the reconnect timer
    Reconnecting,
    /// Transport failed, or reconnect attempts ran out
    Error,
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        *self == ConnectionStatus::Connected
    }

    /// Whether a connection attempt is underway or scheduled
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport currently owned by an entry
pub(super) struct ActiveTransport {
    /// Attempt number; events carrying another id are stale
    pub id: u64,
    pub handle: Box<dyn Transport>,
}

/// Pending reconnect timer
pub(super) struct PendingTimer {
    pub id: u64,
    pub handle: TimerHandle,
}

/// Entry for a single shared connection in the registry
///
/// The reference count is the length of `subscribers`; there is no separate
/// counter to drift out of sync.
pub(crate) struct ConnectionEntry<M> {
    /// Equivalence key this entry is stored under
    pub(super) key: ConnectionKey,
    /// Address passed to the connector on every open
    pub(super) address: String,
    /// Configuration of the first subscriber (equal for all, by key)
    pub(super) config: Arc<SocketConfig<M>>,
    /// Current lifecycle status
    pub(super) status: ConnectionStatus,
    /// Owned transport, if one is open or opening
    pub(super) transport: Option<ActiveTransport>,
    /// Attached bindings in attachment order
    pub(super) subscribers: Vec<AttachedBinding<M>>,
    /// Reconnect attempts since the last successful open
    pub(super) retry_count: u32,
    /// Outgoing messages waiting for the connection to open
    pub(super) queue: VecDeque<M>,
    /// Set by kill; suppresses reconnects until the next connect
    pub(super) killed: bool,
    /// At most one pending reconnect timer
    pub(super) reconnect_timer: Option<PendingTimer>,
    /// Inbound messages decoded and delivered
    pub(super) messages_received: u64,
    /// Outbound messages handed to the transport
    pub(super) messages_sent: u64,
    /// Messages lost to queue overflow, codec failures or a closed transport
    pub(super) messages_dropped: u64,
}

impl<M> ConnectionEntry<M> {
    pub(super) fn new(key: ConnectionKey, address: String, config: Arc<SocketConfig<M>>) -> Self {
        Self {
            key,
            address,
            config,
            status: ConnectionStatus::Disconnected,
            transport: None,
            subscribers: Vec::new(),
            retry_count: 0,
            queue: VecDeque::new(),
            killed: false,
            reconnect_timer: None,
            messages_received: 0,
            messages_sent: 0,
            messages_dropped: 0,
        }
    }

    /// Number of attached bindings
    pub fn ref_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(super) fn is_attached(&self, id: BindingId) -> bool {
        self.subscribers.iter().any(|b| b.id == id)
    }

    /// Add a binding; returns false if it was already attached
    pub(super) fn attach(&mut self, id: BindingId, callbacks: Arc<SubscriberCallbacks<M>>) -> bool {
        if self.is_attached(id) {
            return false;
        }
        self.subscribers.push(AttachedBinding { id, callbacks });
        true
    }

    /// Remove a binding; returns false if it was not attached
    pub(super) fn detach(&mut self, id: BindingId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|b| b.id != id);
        self.subscribers.len() != before
    }

    /// Append to the outgoing queue, dropping the oldest past capacity
    ///
    /// Returns the number of messages dropped.
    pub(super) fn enqueue(&mut self, message: M) -> usize {
        self.queue.push_back(message);

        let mut dropped = 0;
        while self.queue.len() > self.config.max_queue_size {
            self.queue.pop_front();
            dropped += 1;
        }
        self.messages_dropped += dropped as u64;
        dropped
    }

    /// Snapshot of the entry for observability
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            key: self.key.clone(),
            address: self.address.clone(),
            status: self.status,
            subscriber_count: self.ref_count(),
            queue_len: self.queue.len(),
            retry_count: self.retry_count,
            killed: self.killed,
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            messages_dropped: self.messages_dropped,
        }
    }
}

/// Point-in-time view of a connection entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Equivalence key of the connection
    pub key: ConnectionKey,
    /// Address the connection opens against
    pub address: String,
    /// Lifecycle status at snapshot time
    pub status: ConnectionStatus,
    /// Reference count (attached bindings)
    pub subscriber_count: usize,
    /// Outgoing messages waiting for the connection to open
    pub queue_len: usize,
    /// Reconnect attempts since the last successful open
    pub retry_count: u32,
    /// Kill flag; suppresses reconnects until the next connect
    pub killed: bool,
    /// Inbound messages decoded and delivered
    pub messages_received: u64,
    /// Outbound messages handed to the transport
    pub messages_sent: u64,
    /// Messages dropped by queue overflow, codec failures or while closed
    pub messages_dropped: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn entry(max_queue: usize) -> ConnectionEntry<Value> {
        let config = SocketConfig::default().max_queue_size(max_queue);
        let key = ConnectionKey::derive("ws://test", &config);
        ConnectionEntry::new(key, "ws://test".into(), Arc::new(config))
    }

    fn noop_callbacks() -> Arc<SubscriberCallbacks<Value>> {
        Arc::new(SubscriberCallbacks::new(|_| {}, |_| {}, |_| {}))
    }

    #[test]
    fn test_new_entry() {
        let entry = entry(10);
        assert_eq!(entry.status, ConnectionStatus::Disconnected);
        assert_eq!(entry.ref_count(), 0);

        let info = entry.info();
        assert_eq!(info.address, "ws://test");
        assert_eq!(info.queue_len, 0);
        assert!(!info.killed);
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut entry = entry(10);
        let id = BindingId::next();

        assert!(entry.attach(id, noop_callbacks()));
        assert!(!entry.attach(id, noop_callbacks()));
        assert_eq!(entry.ref_count(), 1);

        assert!(entry.detach(id));
        assert!(!entry.detach(id));
        assert_eq!(entry.ref_count(), 0);
    }

    #[test]
    fn test_queue_keeps_newest() {
        let mut entry = entry(3);

        let mut dropped = 0;
        for n in 0..5 {
            dropped += entry.enqueue(json!(n));
        }

        assert_eq!(dropped, 2);
        assert_eq!(
            entry.queue.iter().cloned().collect::<Vec<_>>(),
            vec![json!(2), json!(3), json!(4)]
        );
        assert_eq!(entry.info().messages_dropped, 2);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Reconnecting.to_string(), "reconnecting");
        assert!(ConnectionStatus::Connected.is_open());
        assert!(ConnectionStatus::Connecting.is_pending());
        assert!(!ConnectionStatus::Error.is_pending());
    }
}
