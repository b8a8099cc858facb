//! Shared WebSocket connections for many consumers
//!
//! Several parts of an application often want the same live feed. Opening a
//! socket per consumer wastes connections and lets their views drift apart.
//! `socket-share` keeps one connection per distinct address and config, counts
//! the consumers attached to it, reconnects it with linear backoff, queues
//! outgoing messages while it is down and decodes each inbound frame once for
//! every consumer.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::{json, Value};
//! use socket_share::{SocketConfig, SocketRegistry};
//!
//! # async fn example() {
//! let registry = SocketRegistry::<Value>::websocket();
//!
//! let prices = registry.subscribe("wss://feed.example.com/prices", SocketConfig::default());
//! let chart = registry.subscribe("wss://feed.example.com/prices", SocketConfig::default());
//! assert_eq!(prices.key(), chart.key());
//!
//! prices.connect();
//! chart.connect(); // shares the socket opened above
//!
//! prices.send(json!({"subscribe": "BTC-USD"}));
//! println!("latest: {:?}", chart.last_message());
//! # }
//! ```
//!
//! # Modules
//!
//! - [`registry`]: connection entries, the lifecycle engine and the public handle
//! - [`subscription`]: per-consumer handle with its own status, last message and history
//! - [`config`]: per-connection options
//! - [`codec`]: message parse/serialize pairs
//! - [`transport`]: transport capability and the WebSocket implementation
//! - [`timer`]: timer capability used for reconnect scheduling

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod subscription;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use codec::{CodecIdentity, MessageCodec};
pub use config::{ReconnectLimit, SocketConfig};
pub use error::{CodecError, Error, TransportError};
pub use registry::{
    BindingId, ConnectionInfo, ConnectionKey, ConnectionStatus, SocketRegistry,
    SubscriberCallbacks,
};
pub use subscription::Subscription;
pub use timer::{Scheduler, TimerHandle, TokioScheduler};
pub use transport::{Connector, Frame, Transport, TransportEvent, WsConnector};
