//! WebSocket transport using tokio-tungstenite
//!
//! Each opened transport runs one background task that owns the socket. The
//! task reads frames into the event sink and writes whatever the engine
//! queues through the [`Transport`] handle.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;

use super::{Connector, EventSink, Frame, OpenRequest, Transport, TransportEvent};

const PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// Connector for `ws://` and `wss://` addresses
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &self,
        request: OpenRequest<'_>,
        events: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let client_request = build_request(request)?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(client_request, rx, events));

        Ok(Box::new(WsTransport { outbound: tx }))
    }
}

fn build_request(request: OpenRequest<'_>) -> Result<Request, TransportError> {
    let mut client_request = request
        .address
        .into_client_request()
        .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", request.address, e)))?;

    if !request.protocols.is_empty() {
        let value = HeaderValue::from_str(&request.protocols.join(", "))
            .map_err(|e| TransportError::InvalidAddress(format!("bad protocol list: {}", e)))?;
        client_request.headers_mut().insert(PROTOCOL_HEADER, value);
    }

    Ok(client_request)
}

enum Outbound {
    Text(String),
    Close,
}

struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_socket(
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let uri = request.uri().to_string();

    // A close (or a dropped handle) while the handshake is pending abandons it
    let stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::debug!(uri = %uri, error = %e, "WebSocket handshake failed");
                events.emit(TransportEvent::Error(TransportError::OpenFailed(e.to_string())));
                events.emit(TransportEvent::Closed { reason: None });
                return;
            }
        },
        _ = outbound.recv() => {
            tracing::debug!(uri = %uri, "WebSocket closed before handshake completed");
            return;
        }
    };

    tracing::debug!(uri = %uri, "WebSocket open");
    events.emit(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Message(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    events.emit(TransportEvent::Message(Frame::Binary(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.as_str().to_owned());
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.emit(TransportEvent::Error(TransportError::Io(e.to_string())));
                    break None;
                }
                None => break None,
            },
            next = outbound.recv() => match next {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        events.emit(TransportEvent::Error(TransportError::Io(e.to_string())));
                        break None;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break Some("closed locally".to_owned());
                }
            }
        }
    };

    tracing::debug!(uri = %uri, reason = ?reason, "WebSocket closed");
    events.emit(TransportEvent::Closed { reason });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    fn sink() -> (EventSink, UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    async fn next_event(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    /// Echo server accepting a single connection
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    ws.send(msg).await.unwrap();
                } else if msg.is_close() {
                    break;
                }
            }
        });

        format!("ws://{}", addr)
    }

    #[test]
    fn test_build_request_sets_protocols() {
        let protocols = vec!["chat".to_string(), "v2".to_string()];
        let request = build_request(OpenRequest {
            address: "ws://localhost:9000/feed",
            protocols: &protocols,
        })
        .unwrap();

        let header = request.headers().get(PROTOCOL_HEADER).unwrap();
        assert_eq!(header.to_str().unwrap(), "chat, v2");
    }

    #[test]
    fn test_invalid_address() {
        let (events, _rx) = sink();
        let result = WsConnector.open(
            OpenRequest {
                address: "not a url",
                protocols: &[],
            },
            events,
        );
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let address = spawn_echo_server().await;
        let (events, mut rx) = sink();

        let mut transport = WsConnector
            .open(
                OpenRequest {
                    address: &address,
                    protocols: &[],
                },
                events,
            )
            .unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);

        transport.send_text("hello".to_string()).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message(Frame::Text("hello".to_string()))
        );

        transport.close();
        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Closed { .. }
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (events, mut rx) = sink();
        let _transport = WsConnector
            .open(
                OpenRequest {
                    address: &format!("ws://{}", addr),
                    protocols: &[],
                },
                events,
            )
            .unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Error(TransportError::OpenFailed(_))
        ));
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed { reason: None }
        );
    }
}
