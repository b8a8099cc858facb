//! Connection keys
//!
//! A key decides whether two subscriptions share one underlying connection.
//! It is derived once from the address and configuration; equal inputs give
//! equal keys and any difference gives a different key.

use serde_json::Value;

use crate::config::SocketConfig;

/// Equivalence key of a shared connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    /// Derive the key for `address` under `config`
    ///
    /// Components are encoded as a JSON array, in a fixed order, so no
    /// separator inside an address or protocol name can make two different
    /// configurations collide. Protocols are sorted first; their order in
    /// the handshake does not change the key.
    ///
    /// The last component is the explicit `key` when one is set, otherwise
    /// the codec identity.
    pub fn derive<M>(address: &str, config: &SocketConfig<M>) -> Self {
        let mut protocols = config.protocols.clone();
        protocols.sort();

        let identity = match &config.key {
            Some(key) => format!("key:{}", key),
            None => format!("codec:{}", config.codec.identity()),
        };

        let components = Value::Array(vec![
            Value::from(address),
            Value::from(protocols),
            Value::from(config.auto_reconnect),
            Value::from(config.reconnect_attempts.to_string()),
            Value::from(config.reconnect_interval.as_nanos().to_string()),
            Value::from(config.queue_messages),
            Value::from(config.max_queue_size as u64),
            Value::from(identity),
        ]);

        Self(components.to_string())
    }

    /// Wrap an already-derived key
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
