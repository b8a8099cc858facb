//! Lifecycle engine
//!
//! All connection state lives here and is only touched from one task. Public
//! operations, transport events and timer expirations arrive as [`Command`]s
//! on a single queue and are applied in arrival order, so there is never more
//! than one mutation in flight.
//!
//! ```text
//!  connect ──► disconnected ──open──► connecting ──opened──► connected
//!                   ▲                  │    ▲                  │
//!                   │        open failed    │ timer       closed│
//!                   │                  ▼    │                  ▼
//!                   │                error ─┴─► reconnecting ◄─┘
//!                   │                  ▲              │
//!                   └──── kill ────────┴── exhausted ─┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::SocketConfig;
use crate::error::{report, Error, TransportError};
use crate::timer::Scheduler;
use crate::transport::{Connector, EventSink, OpenRequest, TransportEvent};

use super::binding::{BindingId, SubscriberCallbacks};
use super::entry::{
    ActiveTransport, ConnectionEntry, ConnectionInfo, ConnectionStatus, PendingTimer,
};
use super::key::ConnectionKey;

/// Input to the engine
pub(crate) enum Command<M> {
    /// Attach a binding and make sure the connection is up
    Connect {
        key: ConnectionKey,
        address: String,
        config: Arc<SocketConfig<M>>,
        binding: BindingId,
        callbacks: Arc<SubscriberCallbacks<M>>,
    },
    /// Detach a binding; the last one tears the connection down
    Disconnect { key: ConnectionKey, binding: BindingId },
    Send { key: ConnectionKey, message: M },
    Kill { key: ConnectionKey },
    ClearQueue { key: ConnectionKey },
    Snapshot { reply: oneshot::Sender<Vec<ConnectionInfo>> },
    Info {
        key: ConnectionKey,
        reply: oneshot::Sender<Option<ConnectionInfo>>,
    },
    Transport {
        key: ConnectionKey,
        connection_id: u64,
        event: TransportEvent,
    },
    ReconnectDue { key: ConnectionKey, timer_id: u64 },
    Shutdown,
}

/// Collaborators the state machine drives
///
/// Kept apart from the entry map so a transition can borrow one entry
/// mutably alongside these.
struct Lifecycle<M> {
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    queue: mpsc::UnboundedSender<Command<M>>,
    next_id: u64,
}

impl<M: Send + Sync + 'static> Lifecycle<M> {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Change status and tell every attached binding
    fn set_status(&self, entry: &mut ConnectionEntry<M>, status: ConnectionStatus) {
        if entry.status == status {
            return;
        }

        tracing::debug!(
            key = %entry.key,
            from = %entry.status,
            to = %status,
            subscribers = entry.ref_count(),
            "Status change"
        );

        entry.status = status;
        for binding in &entry.subscribers {
            binding.callbacks.set_status(status);
        }
    }

    fn attach(
        &self,
        entry: &mut ConnectionEntry<M>,
        binding: BindingId,
        callbacks: Arc<SubscriberCallbacks<M>>,
    ) {
        if entry.attach(binding, Arc::clone(&callbacks)) {
            // Late joiners start from the current status, not a default
            callbacks.set_status(entry.status);
            tracing::debug!(
                key = %entry.key,
                binding = %binding,
                subscribers = entry.ref_count(),
                "Subscriber attached"
            );
        }
    }

    /// Manual connect: clears the kill flag and opens unless already underway
    fn connect(&mut self, entry: &mut ConnectionEntry<M>) {
        if entry.killed {
            tracing::info!(key = %entry.key, "Kill flag cleared by connect");
            entry.killed = false;
        }

        if entry.transport.is_none() && entry.reconnect_timer.is_none() {
            entry.retry_count = 0;
            self.open(entry);
        }
    }

    fn open(&mut self, entry: &mut ConnectionEntry<M>) {
        self.cancel_timer(entry);
        if let Some(mut previous) = entry.transport.take() {
            previous.handle.close();
        }

        let connection_id = self.next_id();
        self.set_status(entry, ConnectionStatus::Connecting);

        let queue = self.queue.clone();
        let key = entry.key.clone();
        let sink = EventSink::new(move |event| {
            let _ = queue.send(Command::Transport {
                key: key.clone(),
                connection_id,
                event,
            });
        });

        let request = OpenRequest {
            address: &entry.address,
            protocols: &entry.config.protocols,
        };

        tracing::info!(
            key = %entry.key,
            address = %entry.address,
            attempt = entry.retry_count,
            "Opening connection"
        );

        match self.connector.open(request, sink) {
            Ok(handle) => {
                entry.transport = Some(ActiveTransport {
                    id: connection_id,
                    handle,
                });
            }
            Err(err) => {
                report(&Error::OpenFailed(entry.key.clone(), err));
                self.open_failed(entry);
            }
        }
    }

    fn open_failed(&mut self, entry: &mut ConnectionEntry<M>) {
        self.set_status(entry, ConnectionStatus::Error);
        if entry.config.auto_reconnect && !entry.killed {
            self.schedule_reconnect(entry);
        }
    }

    /// Transport went away after being open
    fn closed(&mut self, entry: &mut ConnectionEntry<M>) {
        if !entry.killed && entry.config.auto_reconnect && entry.ref_count() > 0 {
            self.schedule_reconnect(entry);
        } else {
            self.set_status(entry, ConnectionStatus::Disconnected);
        }
    }

    fn schedule_reconnect(&mut self, entry: &mut ConnectionEntry<M>) {
        self.cancel_timer(entry);

        if entry.config.reconnect_attempts.is_exhausted(entry.retry_count) {
            report(&Error::ReconnectExhausted(
                entry.key.clone(),
                entry.retry_count,
            ));
            self.set_status(entry, ConnectionStatus::Error);
            return;
        }

        entry.retry_count += 1;
        let delay = entry.config.reconnect_delay(entry.retry_count);
        let timer_id = self.next_id();

        let queue = self.queue.clone();
        let key = entry.key.clone();
        let handle = self.scheduler.set_timer(
            delay,
            Box::new(move || {
                let _ = queue.send(Command::ReconnectDue { key, timer_id });
            }),
        );
        entry.reconnect_timer = Some(PendingTimer {
            id: timer_id,
            handle,
        });

        tracing::info!(
            key = %entry.key,
            attempt = entry.retry_count,
            max_attempts = %entry.config.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        self.set_status(entry, ConnectionStatus::Reconnecting);
    }

    fn cancel_timer(&self, entry: &mut ConnectionEntry<M>) {
        if let Some(timer) = entry.reconnect_timer.take() {
            timer.handle.cancel();
        }
    }

    fn reconnect_due(&mut self, entry: &mut ConnectionEntry<M>, timer_id: u64) {
        if entry.reconnect_timer.as_ref().map(|t| t.id) != Some(timer_id) {
            tracing::trace!(key = %entry.key, timer_id, "Stale reconnect timer ignored");
            return;
        }
        entry.reconnect_timer = None;

        if entry.killed {
            return;
        }
        self.open(entry);
    }

    fn transport_event(
        &mut self,
        entry: &mut ConnectionEntry<M>,
        connection_id: u64,
        event: TransportEvent,
    ) {
        if entry.transport.as_ref().map(|t| t.id) != Some(connection_id) {
            tracing::trace!(key = %entry.key, connection_id, "Stale transport event ignored");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if entry.status != ConnectionStatus::Connecting {
                    return;
                }
                entry.retry_count = 0;
                tracing::info!(key = %entry.key, "Connected");
                self.set_status(entry, ConnectionStatus::Connected);
                self.flush(entry);
            }
            TransportEvent::Message(frame) => self.receive(entry, frame),
            TransportEvent::Error(err) => {
                if entry.status == ConnectionStatus::Connecting {
                    report(&Error::OpenFailed(entry.key.clone(), err));
                    self.drop_transport(entry);
                    self.open_failed(entry);
                } else {
                    report(&Error::Transport(entry.key.clone(), err));
                    self.set_status(entry, ConnectionStatus::Error);
                }
            }
            TransportEvent::Closed { reason } => {
                tracing::info!(key = %entry.key, reason = ?reason, "Connection closed");
                let was_connecting = entry.status == ConnectionStatus::Connecting;
                self.drop_transport(entry);

                if was_connecting {
                    let reason = reason.unwrap_or_else(|| "closed during handshake".to_owned());
                    report(&Error::OpenFailed(
                        entry.key.clone(),
                        TransportError::OpenFailed(reason),
                    ));
                    self.open_failed(entry);
                } else {
                    self.closed(entry);
                }
            }
        }
    }

    fn drop_transport(&self, entry: &mut ConnectionEntry<M>) {
        if let Some(mut transport) = entry.transport.take() {
            transport.handle.close();
        }
    }

    /// Decode once, then fan out in attachment order
    fn receive(&self, entry: &mut ConnectionEntry<M>, frame: crate::transport::Frame) {
        let decoded = frame
            .into_text()
            .and_then(|text| entry.config.codec.parse(&text));

        let message = match decoded {
            Ok(message) => Arc::new(message),
            Err(err) => {
                entry.messages_dropped += 1;
                report(&Error::Decode(entry.key.clone(), err));
                return;
            }
        };

        entry.messages_received += 1;
        for binding in &entry.subscribers {
            binding.callbacks.deliver(&message);
        }
    }

    fn send(&self, entry: &mut ConnectionEntry<M>, message: M) {
        if entry.status.is_open() && entry.transport.is_some() {
            self.transmit(entry, &message);
        } else if entry.config.queue_messages {
            let dropped = entry.enqueue(message);
            tracing::debug!(
                key = %entry.key,
                queued = entry.queue.len(),
                dropped,
                "Message queued"
            );
        } else {
            entry.messages_dropped += 1;
            report(&Error::NotConnected(entry.key.clone()));
        }
    }

    /// Drain the queue in insertion order; a failed entry does not stop it
    fn flush(&self, entry: &mut ConnectionEntry<M>) {
        if entry.queue.is_empty() {
            return;
        }

        tracing::debug!(key = %entry.key, queued = entry.queue.len(), "Flushing queue");
        while let Some(message) = entry.queue.pop_front() {
            self.transmit(entry, &message);
        }
    }

    fn transmit(&self, entry: &mut ConnectionEntry<M>, message: &M) {
        let text = match entry.config.codec.serialize(message) {
            Ok(text) => text,
            Err(err) => {
                entry.messages_dropped += 1;
                report(&Error::Encode(entry.key.clone(), err));
                return;
            }
        };

        let Some(transport) = entry.transport.as_mut() else {
            entry.messages_dropped += 1;
            report(&Error::NotConnected(entry.key.clone()));
            return;
        };

        match transport.handle.send_text(text) {
            Ok(()) => entry.messages_sent += 1,
            Err(err) => {
                entry.messages_dropped += 1;
                report(&Error::Transport(entry.key.clone(), err));
            }
        }
    }

    /// Forced disconnect; keeps queue and subscribers
    fn kill(&self, entry: &mut ConnectionEntry<M>) {
        self.cancel_timer(entry);
        self.drop_transport(entry);
        entry.killed = true;

        tracing::info!(
            key = %entry.key,
            subscribers = entry.ref_count(),
            queued = entry.queue.len(),
            "Connection killed"
        );
        self.set_status(entry, ConnectionStatus::Disconnected);
    }

    /// Final cleanup once the last binding is gone
    fn teardown(&self, mut entry: ConnectionEntry<M>) {
        self.cancel_timer(&mut entry);
        self.drop_transport(&mut entry);
        tracing::info!(key = %entry.key, "Connection entry removed");
    }
}

/// The registry state and its state machine
pub(crate) struct Engine<M> {
    entries: HashMap<ConnectionKey, ConnectionEntry<M>>,
    lifecycle: Lifecycle<M>,
}

impl<M: Send + Sync + 'static> Engine<M> {
    pub fn new(
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn Scheduler>,
        queue: mpsc::UnboundedSender<Command<M>>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            lifecycle: Lifecycle {
                connector,
                scheduler,
                queue,
                next_id: 0,
            },
        }
    }

    /// Process commands until shutdown
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<M>>) {
        while let Some(command) = commands.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        self.shutdown();
    }

    /// Apply one command; returns false when the engine should stop
    pub fn handle(&mut self, command: Command<M>) -> bool {
        match command {
            Command::Connect {
                key,
                address,
                config,
                binding,
                callbacks,
            } => {
                let entry = self.entries.entry(key.clone()).or_insert_with(|| {
                    tracing::info!(key = %key, address = %address, "Connection entry created");
                    ConnectionEntry::new(key.clone(), address, config)
                });
                self.lifecycle.attach(entry, binding, callbacks);
                self.lifecycle.connect(entry);
            }
            Command::Disconnect { key, binding } => {
                let Some(entry) = self.entries.get_mut(&key) else {
                    return true;
                };
                if !entry.detach(binding) {
                    return true;
                }

                tracing::debug!(
                    key = %key,
                    binding = %binding,
                    subscribers = entry.ref_count(),
                    "Subscriber detached"
                );

                if entry.ref_count() == 0 {
                    if let Some(entry) = self.entries.remove(&key) {
                        self.lifecycle.teardown(entry);
                    }
                }
            }
            Command::Send { key, message } => match self.entries.get_mut(&key) {
                Some(entry) => self.lifecycle.send(entry, message),
                None => report(&Error::UnknownConnection(key)),
            },
            Command::Kill { key } => match self.entries.get_mut(&key) {
                Some(entry) => self.lifecycle.kill(entry),
                None => tracing::debug!(key = %key, "Kill for unknown connection ignored"),
            },
            Command::ClearQueue { key } => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    let cleared = entry.queue.len();
                    entry.queue.clear();
                    tracing::info!(key = %key, cleared, "Queue cleared");
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Info { key, reply } => {
                let _ = reply.send(self.entries.get(&key).map(ConnectionEntry::info));
            }
            Command::Transport {
                key,
                connection_id,
                event,
            } => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    self.lifecycle.transport_event(entry, connection_id, event);
                }
            }
            Command::ReconnectDue { key, timer_id } => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    self.lifecycle.reconnect_due(entry, timer_id);
                }
            }
            Command::Shutdown => return false,
        }

        true
    }

    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<_> = self.entries.values().map(ConnectionEntry::info).collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Tear down every entry
    pub fn shutdown(&mut self) {
        for (_, entry) in self.entries.drain() {
            self.lifecycle.teardown(entry);
        }
        tracing::info!("Connection registry shut down");
    }
}
