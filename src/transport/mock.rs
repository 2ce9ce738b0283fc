//! In-memory transport for engine tests
//!
//! No sockets: `emit` records frames for assertions, and tests inject
//! server behavior by pushing frames and connectivity transitions through
//! the same broadcast channel the real manager uses.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use super::manager::{ConnectionState, Transport, TransportEvent};
use super::protocol::{ClientFrame, ServerFrame};
use crate::error::ChatError;

/// Mock transport with scripted connectivity and recorded emissions.
pub struct MockTransport {
    events: broadcast::Sender<TransportEvent>,
    /// Frames the engine has emitted, in order
    pub sent: RwLock<Vec<ClientFrame>>,
    pub connected: AtomicBool,
    pub connect_calls: AtomicUsize,
    /// When set, `emit` fails as if the connection just dropped
    pub fail_emits: AtomicBool,
    /// When set, `connect` returns without coming up, as if the first
    /// dial were still in flight; the test pushes Connected later
    pub connect_pending: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            sent: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            fail_emits: AtomicBool::new(false),
            connect_pending: AtomicBool::new(false),
        }
    }

    /// Inject an inbound frame as if the server pushed it.
    pub fn push_frame(&self, frame: ServerFrame) {
        let _ = self.events.send(TransportEvent::Frame(frame));
    }

    /// Simulate the supervisor re-establishing the connection.
    pub fn push_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
    }

    /// Simulate the connection dropping out from under the engine.
    pub fn push_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected);
    }

    /// Snapshot of everything emitted so far.
    pub async fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent.read().await.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), ChatError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.connect_pending.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Disconnected);
        }
    }

    async fn emit(&self, frame: ClientFrame) -> Result<(), ChatError> {
        if self.fail_emits.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(ChatError::NotConnected);
        }
        self.sent.write().await.push(frame);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}
