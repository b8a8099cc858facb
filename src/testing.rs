//! In-crate test doubles: a recording connector and a manual scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::timer::{Scheduler, TimerCallback, TimerHandle};
use crate::transport::{Connector, EventSink, Frame, OpenRequest, Transport, TransportEvent};

/// One call to `MockConnector::open`
#[derive(Clone)]
pub struct MockSocket {
    pub address: String,
    pub protocols: Vec<String>,
    pub events: EventSink,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockSocket {
    pub fn open(&self) {
        self.events.emit(TransportEvent::Opened);
    }

    pub fn receive(&self, text: &str) {
        self.events
            .emit(TransportEvent::Message(Frame::Text(text.to_string())));
    }

    pub fn fail(&self) {
        self.events
            .emit(TransportEvent::Error(TransportError::Io("boom".into())));
    }

    pub fn drop_connection(&self) {
        self.events.emit(TransportEvent::Closed {
            reason: Some("remote".into()),
        });
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Transport for MockTransport {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that records every open and never touches the network
#[derive(Default)]
pub struct MockConnector {
    sockets: Mutex<Vec<MockSocket>>,
    refuse: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent `open` calls fail synchronously
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn last(&self) -> MockSocket {
        self.sockets
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no socket opened")
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        request: OpenRequest<'_>,
        events: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::OpenFailed("refused".into()));
        }

        let socket = MockSocket {
            address: request.address.to_string(),
            protocols: request.protocols.to_vec(),
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let transport = MockTransport {
            sent: Arc::clone(&socket.sent),
            closed: Arc::clone(&socket.closed),
        };
        self.sockets.lock().unwrap().push(socket);

        Ok(Box::new(transport))
    }
}

struct ManualTimer {
    delay: Duration,
    callback: Option<TimerCallback>,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler whose timers only fire when the test says so
#[derive(Default)]
pub struct ManualScheduler {
    timers: Mutex<Vec<ManualTimer>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delay ever scheduled, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.timers.lock().unwrap().iter().map(|t| t.delay).collect()
    }

    /// Timers neither fired nor cancelled
    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.callback.is_some() && !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Fire the oldest pending timer; returns false if none
    pub fn fire_next(&self) -> bool {
        let callback = {
            let mut timers = self.timers.lock().unwrap();
            timers
                .iter_mut()
                .find(|t| t.callback.is_some() && !t.cancelled.load(Ordering::SeqCst))
                .and_then(|t| t.callback.take())
        };

        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn set_timer(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().unwrap().push(ManualTimer {
            delay,
            callback: Some(on_fire),
            cancelled: Arc::clone(&cancelled),
        });

        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}
