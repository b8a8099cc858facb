//! Error types
//!
//! None of these cross the public API. The engine absorbs every failure into a
//! status transition or hands it to the reporting sink (`tracing`).

use std::fmt;

use crate::registry::ConnectionKey;

/// Failure raised by a transport or connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The address could not be turned into a connection request
    InvalidAddress(String),
    /// Opening the connection failed
    OpenFailed(String),
    /// The transport is closed and cannot carry frames
    Closed,
    /// Any other runtime failure reported by the transport
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidAddress(addr) => write!(f, "Invalid address: {}", addr),
            TransportError::OpenFailed(reason) => write!(f, "Open failed: {}", reason),
            TransportError::Closed => write!(f, "Transport closed"),
            TransportError::Io(reason) => write!(f, "Transport error: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Failure raised by a parse or serialize function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CodecError {}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::new(err.to_string())
    }
}

/// Non-fatal engine failures, reported and never propagated
#[derive(Debug, Clone)]
pub enum Error {
    /// Connecting failed (recoverable, drives `error`)
    OpenFailed(ConnectionKey, TransportError),
    /// A live transport reported a failure (recoverable, drives `error`)
    Transport(ConnectionKey, TransportError),
    /// Inbound frame could not be decoded; the frame is dropped
    Decode(ConnectionKey, CodecError),
    /// Outbound message could not be encoded; the message is dropped
    Encode(ConnectionKey, CodecError),
    /// Reconnect attempts ran out; the entry stays in `error`
    ReconnectExhausted(ConnectionKey, u32),
    /// Message sent while closed with queueing disabled
    NotConnected(ConnectionKey),
    /// Message sent for a key with no live entry
    UnknownConnection(ConnectionKey),
}

impl Error {
    /// Key of the connection the failure belongs to
    pub fn key(&self) -> &ConnectionKey {
        match self {
            Error::OpenFailed(key, _)
            | Error::Transport(key, _)
            | Error::Decode(key, _)
            | Error::Encode(key, _)
            | Error::ReconnectExhausted(key, _)
            | Error::NotConnected(key)
            | Error::UnknownConnection(key) => key,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OpenFailed(_, err) => write!(f, "Failed to open connection: {}", err),
            Error::Transport(_, err) => write!(f, "{}", err),
            Error::Decode(_, err) => write!(f, "Failed to decode inbound message: {}", err),
            Error::Encode(_, err) => write!(f, "Failed to encode outbound message: {}", err),
            Error::ReconnectExhausted(_, attempts) => {
                write!(f, "Reconnect attempts exhausted after {}", attempts)
            }
            Error::NotConnected(_) => {
                write!(f, "Not connected and queueing disabled, message dropped")
            }
            Error::UnknownConnection(_) => write!(f, "No live connection, message dropped"),
        }
    }
}

impl std::error::Error for Error {}

/// Hand a failure to the reporting sink
///
/// Fire-and-forget: emits a structured `warn` event and returns.
pub(crate) fn report(err: &Error) {
    tracing::warn!(key = %err.key(), error = %err, "Connection error");
}
