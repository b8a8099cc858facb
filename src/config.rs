//! Subscription configuration

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MessageCodec;

/// Default base delay between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default number of reconnect attempts
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default outgoing queue capacity
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Upper bound on reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectLimit {
    /// Stop after this many attempts
    Limited(u32),
    /// Never stop retrying
    Unlimited,
}

impl ReconnectLimit {
    /// Whether `attempts` already made reaches the limit
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        match self {
            ReconnectLimit::Limited(max) => attempts >= *max,
            ReconnectLimit::Unlimited => false,
        }
    }
}

impl std::fmt::Display for ReconnectLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectLimit::Limited(max) => write!(f, "{}", max),
            ReconnectLimit::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Configuration for one subscription
///
/// Immutable once handed to the registry. Every field except `codec`'s
/// functions takes part in the connection key; the codec contributes its
/// identity instead.
pub struct SocketConfig<M> {
    /// Sub-protocols to request during the handshake
    pub protocols: Vec<String>,

    /// Reconnect automatically when the connection drops
    pub auto_reconnect: bool,

    /// Maximum reconnect attempts before giving up
    pub reconnect_attempts: ReconnectLimit,

    /// Base delay; attempt N waits `reconnect_interval * N`
    pub reconnect_interval: Duration,

    /// Queue outgoing messages while not connected
    pub queue_messages: bool,

    /// Maximum queued messages (oldest are dropped first)
    pub max_queue_size: usize,

    /// Parse/serialize pair for frames
    pub codec: MessageCodec<M>,

    /// Explicit identity; replaces the codec identity in the key
    pub key: Option<String>,
}

// Manual impls: deriving would demand `M: Clone + Debug`.
impl<M> Clone for SocketConfig<M> {
    fn clone(&self) -> Self {
        Self {
            protocols: self.protocols.clone(),
            auto_reconnect: self.auto_reconnect,
            reconnect_attempts: self.reconnect_attempts,
            reconnect_interval: self.reconnect_interval,
            queue_messages: self.queue_messages,
            max_queue_size: self.max_queue_size,
            codec: self.codec.clone(),
            key: self.key.clone(),
        }
    }
}

impl<M> std::fmt::Debug for SocketConfig<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConfig")
            .field("protocols", &self.protocols)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("queue_messages", &self.queue_messages)
            .field("max_queue_size", &self.max_queue_size)
            .field("codec", &self.codec)
            .field("key", &self.key)
            .finish()
    }
}

impl<M> Default for SocketConfig<M>
where
    M: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::with_codec(MessageCodec::json())
    }
}

impl<M> SocketConfig<M> {
    /// Create a default config using the given codec
    pub fn with_codec(codec: MessageCodec<M>) -> Self {
        Self {
            protocols: Vec::new(),
            auto_reconnect: true,
            reconnect_attempts: ReconnectLimit::Limited(DEFAULT_RECONNECT_ATTEMPTS),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            queue_messages: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            codec,
            key: None,
        }
    }

    /// Add a sub-protocol
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Replace the sub-protocol list
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable automatic reconnect
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the maximum number of reconnect attempts
    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = ReconnectLimit::Limited(attempts);
        self
    }

    /// Retry forever
    pub fn unlimited_reconnects(mut self) -> Self {
        self.reconnect_attempts = ReconnectLimit::Unlimited;
        self
    }

    /// Set the base reconnect delay
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Enable or disable outgoing queueing
    pub fn queue_messages(mut self, enabled: bool) -> Self {
        self.queue_messages = enabled;
        self
    }

    /// Set the outgoing queue capacity
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Set the codec
    pub fn codec(mut self, codec: MessageCodec<M>) -> Self {
        self.codec = codec;
        self
    }

    /// Set an explicit identity key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Delay before reconnect attempt `attempt` (1-indexed, linear)
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_interval.saturating_mul(attempt)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = SocketConfig::<Value>::default();

        assert!(config.protocols.is_empty());
        assert!(config.auto_reconnect);
        assert_eq!(
            config.reconnect_attempts,
            ReconnectLimit::Limited(DEFAULT_RECONNECT_ATTEMPTS)
        );
        assert_eq!(config.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
        assert!(config.queue_messages);
        assert_eq!(config.max_queue_size, DEFAULT_MAX_QUEUE_SIZE);
        assert!(config.key.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let config = SocketConfig::<Value>::default()
            .protocol("chat")
            .protocol("v2")
            .auto_reconnect(false)
            .reconnect_attempts(3)
            .reconnect_interval(Duration::from_millis(250))
            .queue_messages(false)
            .max_queue_size(8)
            .key("room-1");

        assert_eq!(config.protocols, vec!["chat", "v2"]);
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_attempts, ReconnectLimit::Limited(3));
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
        assert!(!config.queue_messages);
        assert_eq!(config.max_queue_size, 8);
        assert_eq!(config.key.as_deref(), Some("room-1"));
    }

    #[test]
    fn test_builder_protocols_replaces() {
        let config = SocketConfig::<Value>::default()
            .protocol("old")
            .protocols(["a", "b"]);

        assert_eq!(config.protocols, vec!["a", "b"]);
    }

    #[test]
    fn test_linear_backoff() {
        let config = SocketConfig::<Value>::default().reconnect_interval(Duration::from_secs(1));

        assert_eq!(config.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(2), Duration::from_millis(2000));
        assert_eq!(config.reconnect_delay(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_reconnect_limit() {
        assert!(!ReconnectLimit::Limited(3).is_exhausted(2));
        assert!(ReconnectLimit::Limited(3).is_exhausted(3));
        assert!(ReconnectLimit::Limited(0).is_exhausted(0));
        assert!(!ReconnectLimit::Unlimited.is_exhausted(u32::MAX));

        let config = SocketConfig::<Value>::default().unlimited_reconnects();
        assert_eq!(config.reconnect_attempts, ReconnectLimit::Unlimited);
    }
}
