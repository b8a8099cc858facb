//! Subscriber bindings
//!
//! A binding is one consumer's attachment to a shared connection. The
//! consumer owns it; the connection entry keeps a clone of the callbacks
//! only while the binding is attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::entry::ConnectionStatus;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one subscription instance (not of its key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type StatusFn = dyn Fn(ConnectionStatus) + Send + Sync;
type MessageFn<M> = dyn Fn(Arc<M>) + Send + Sync;

/// The three callback slots of a binding
///
/// Invoked on the engine task. Decoded messages are shared as `Arc<M>`, so
/// every binding sees the same allocation.
pub struct SubscriberCallbacks<M> {
    set_status: Box<StatusFn>,
    set_last_message: Box<MessageFn<M>>,
    append_history: Box<MessageFn<M>>,
}

impl<M> SubscriberCallbacks<M> {
    pub fn new<S, L, H>(set_status: S, set_last_message: L, append_history: H) -> Self
    where
        S: Fn(ConnectionStatus) + Send + Sync + 'static,
        L: Fn(Arc<M>) + Send + Sync + 'static,
        H: Fn(Arc<M>) + Send + Sync + 'static,
    {
        Self {
            set_status: Box::new(set_status),
            set_last_message: Box::new(set_last_message),
            append_history: Box::new(append_history),
        }
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        (self.set_status)(status)
    }

    /// Deliver one decoded message to both message slots
    pub(crate) fn deliver(&self, message: &Arc<M>) {
        (self.set_last_message)(Arc::clone(message));
        (self.append_history)(Arc::clone(message));
    }
}

impl<M> std::fmt::Debug for SubscriberCallbacks<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberCallbacks").finish_non_exhaustive()
    }
}

/// An attached binding as held by a connection entry
pub(crate) struct AttachedBinding<M> {
    pub id: BindingId,
    pub callbacks: Arc<SubscriberCallbacks<M>>,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_binding_ids_unique() {
        let a = BindingId::next();
        let b = BindingId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_deliver_fills_both_slots() {
        let last = Arc::new(Mutex::new(None));
        let history = Arc::new(Mutex::new(Vec::new()));

        let last_slot = Arc::clone(&last);
        let history_slot = Arc::clone(&history);
        let callbacks = SubscriberCallbacks::new(
            |_| {},
            move |m: Arc<u32>| *last_slot.lock().unwrap() = Some(*m),
            move |m: Arc<u32>| history_slot.lock().unwrap().push(*m),
        );

        callbacks.deliver(&Arc::new(7));
        callbacks.deliver(&Arc::new(8));

        assert_eq!(*last.lock().unwrap(), Some(8));
        assert_eq!(*history.lock().unwrap(), vec![7, 8]);
    }
}
