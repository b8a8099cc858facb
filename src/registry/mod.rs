//! Shared connection registry
//!
//! The registry keeps at most one live connection per [`ConnectionKey`] and
//! hands it to every subscriber that asks for the same address and config.
//! The connection lives exactly as long as at least one binding is attached.
//!
//! # Architecture
//!
//! ```text
//!                           SocketRegistry (clone)
//!                     ┌────────────────────────────┐
//!  connect/send/... ─►│ commands: mpsc::Unbounded  │◄── transport events
//!                     └─────────────┬──────────────┘◄── reconnect timers
//!                                   │
//!                                   ▼
//!                     ┌────────────────────────────┐
//!                     │ Engine (single task)       │
//!                     │ entries: HashMap<Key,      │
//!                     │   ConnectionEntry {        │
//!                     │     transport, queue,      │
//!                     │     subscribers, ...       │
//!                     │   }                        │
//!                     │ >                          │
//!                     └─────────────┬──────────────┘
//!                                   │ callbacks
//!         ┌─────────────────────────┼─────────────────────────┐
//!         ▼                         ▼                         ▼
//!   [Subscription]            [Subscription]            [Subscription]
//!   status, last, history     status, last, history     status, last, history
//! ```
//!
//! # Shared Decoding
//!
//! Each inbound frame is decoded once and delivered to every binding as an
//! `Arc<M>`, so subscribers share one allocation per message.

pub mod binding;
pub(crate) mod engine;
pub mod entry;
pub mod key;
pub mod store;

pub use binding::{BindingId, SubscriberCallbacks};
pub use entry::{ConnectionInfo, ConnectionStatus};
pub use key::ConnectionKey;
pub use store::SocketRegistry;
