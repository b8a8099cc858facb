//! Transport capability
//!
//! The engine does not speak any wire protocol itself. A [`Connector`] opens
//! a [`Transport`] for an address; the transport carries outbound text frames
//! and reports what happens to it as [`TransportEvent`]s through the
//! [`EventSink`] it was given. Events land on the engine's queue, so a
//! transport may emit from any task, or even from inside `open`.

pub mod ws;

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{CodecError, TransportError};

pub use ws::WsConnector;

/// Inbound frame as delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Text content of the frame; binary frames must be valid UTF-8
    pub fn into_text(self) -> Result<String, CodecError> {
        match self {
            Frame::Text(text) => Ok(text),
            Frame::Binary(data) => String::from_utf8(data.to_vec())
                .map_err(|e| CodecError::new(format!("binary frame is not UTF-8: {}", e))),
        }
    }
}

/// Something that happened to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and can carry frames
    Opened,
    /// A frame arrived
    Message(Frame),
    /// The transport failed; a `Closed` usually follows
    Error(TransportError),
    /// The connection is gone
    Closed { reason: Option<String> },
}

/// Where a transport reports its events
///
/// Bound to one connection attempt. Events emitted after the engine moved on
/// to another attempt are ignored.
#[derive(Clone)]
pub struct EventSink {
    emit: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(emit: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Report an event; never blocks
    pub fn emit(&self, event: TransportEvent) {
        (self.emit)(event)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// What to connect to
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub address: &'a str,
    pub protocols: &'a [String],
}

/// Opens transports
pub trait Connector: Send + Sync + 'static {
    /// Start opening a connection
    ///
    /// Returns as soon as the attempt is underway; success is reported later
    /// as `Opened`. An `Err` here is treated like an open failure.
    fn open(
        &self,
        request: OpenRequest<'_>,
        events: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open (or opening) connection owned by one connection entry
pub trait Transport: Send {
    /// Transmit one text frame
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection; calling it twice is harmless
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_binary_frame_into_text() {
        let frame = Frame::Binary(Bytes::from_static(b"hello"));
        assert_eq!(frame.into_text().unwrap(), "hello");

        let frame = Frame::Binary(Bytes::from_static(&[0xff, 0xfe]));
        assert!(frame.into_text().is_err());
    }

    #[test]
    fn test_event_sink_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = EventSink::new(move |event| seen_clone.lock().unwrap().push(event));

        sink.emit(TransportEvent::Opened);
        sink.clone().emit(TransportEvent::Closed { reason: None });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![TransportEvent::Opened, TransportEvent::Closed { reason: None }]
        );
    }
}
