//! WebSocket connection manager
//!
//! Owns the single push-channel connection for one engine instance:
//! - guarded connect: a second `connect()` while live is a logged no-op
//! - presence announce (`user:join`) as the first frame of every connection
//! - supervision: when the connection drops, re-dials on a fixed interval
//!   and re-announces, so callers never manage reconnects themselves
//! - idempotent `disconnect()` for session teardown
//!
//! Inbound frames and connectivity transitions are fanned out through a
//! broadcast channel; the engine owns the single long-lived subscriber and
//! tests may attach more.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{ClientFrame, ServerFrame};
use crate::error::ChatError;

/// Broadcast capacity for transport events
const EVENT_CAPACITY: usize = 256;
/// Queue depth for frames awaiting the writer
const OUTBOUND_CAPACITY: usize = 64;

/// Connectivity state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Events fanned out to transport subscribers.
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Frame(ServerFrame),
}

/// Abstract interface over the push channel.
///
/// Implementations must be `Send + Sync` for `Arc<dyn Transport>` sharing.
/// - [`WsConnectionManager`]: the real WebSocket client
/// - [`MockTransport`](super::MockTransport): in-memory double for engine tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection and announce presence. Guarded: calling while a
    /// connection is already live (or being supervised) logs a warning and
    /// returns `Ok` without side effects.
    async fn connect(&self) -> Result<(), ChatError>;

    /// Tear the connection down. Idempotent.
    async fn disconnect(&self);

    /// Queue a frame for delivery over the live connection.
    async fn emit(&self, frame: ClientFrame) -> Result<(), ChatError>;

    /// Subscribe to connectivity transitions and inbound frames.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Current connectivity.
    fn state(&self) -> ConnectionState;
}

// ============================================================================
// WebSocket implementation
// ============================================================================

/// Supervised WebSocket transport.
///
/// `connect()` spawns a supervisor task that dials, announces, pumps frames
/// in both directions, and re-dials after `reconnect_delay` whenever the
/// connection ends for any reason other than `disconnect()`.
pub struct WsConnectionManager {
    url: String,
    user_id: String,
    reconnect_delay: Duration,
    ping_interval: Duration,
    events: broadcast::Sender<TransportEvent>,
    outbound: Arc<Mutex<Option<mpsc::Sender<ClientFrame>>>>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WsConnectionManager {
    pub fn new(
        url: &str,
        user_id: &str,
        reconnect_delay: Duration,
        ping_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            url: url.to_string(),
            user_id: user_id.to_string(),
            reconnect_delay,
            ping_interval,
            events,
            outbound: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            supervisor: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for WsConnectionManager {
    async fn connect(&self) -> Result<(), ChatError> {
        let mut slot = self.supervisor.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                warn!("connect() called while a connection is active; ignoring");
                return Ok(());
            }
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let supervisor = Supervisor {
            url: self.url.clone(),
            user_id: self.user_id.clone(),
            reconnect_delay: self.reconnect_delay,
            ping_interval: self.ping_interval,
            events: self.events.clone(),
            outbound: Arc::clone(&self.outbound),
            connected: Arc::clone(&self.connected),
            shutdown: Arc::clone(&self.shutdown),
        };
        *slot = Some(tokio::spawn(supervisor.run()));
        Ok(())
    }

    async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().await.take() {
            // the supervisor may be parked in a session or between dials
            handle.abort();
        }
        *self.outbound.lock().await = None;
        // whoever swaps first emits; the session close path uses the same
        // guard, so subscribers see exactly one Disconnected per connection
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Disconnected);
        }
        debug!("push channel shut down");
    }

    async fn emit(&self, frame: ClientFrame) -> Result<(), ChatError> {
        let sender = self.outbound.lock().await.clone();
        match sender {
            Some(sender) => sender
                .send(frame)
                .await
                .map_err(|_| ChatError::NotConnected),
            None => Err(ChatError::NotConnected),
        }
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

// ============================================================================
// Supervisor task
// ============================================================================

struct Supervisor {
    url: String,
    user_id: String,
    reconnect_delay: Duration,
    ping_interval: Duration,
    events: broadcast::Sender<TransportEvent>,
    outbound: Arc<Mutex<Option<mpsc::Sender<ClientFrame>>>>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    async fn run(self) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %self.url, "push channel connected");
                    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
                    // presence goes first so server-side routing picks this
                    // session up before anything else is written
                    if tx
                        .send(ClientFrame::UserJoin(self.user_id.clone()))
                        .await
                        .is_err()
                    {
                        warn!("presence announce could not be queued");
                    }
                    *self.outbound.lock().await = Some(tx);
                    self.connected.store(true, Ordering::SeqCst);
                    let _ = self.events.send(TransportEvent::Connected);

                    self.run_session(stream, rx).await;

                    // no await between the swap and the send, so an abort
                    // cannot strand the channel without a Disconnected
                    if self.connected.swap(false, Ordering::SeqCst) {
                        let _ = self.events.send(TransportEvent::Disconnected);
                    }
                    *self.outbound.lock().await = None;
                    info!("push channel closed");
                }
                Err(e) => {
                    debug!(url = %self.url, error = %e, "push channel dial failed");
                }
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Pump one live connection until it ends: outbound frames from the
    /// engine, inbound frames to subscribers, pings on a timer.
    async fn run_session<S>(
        &self,
        stream: WebSocketStream<S>,
        mut outbound: mpsc::Receiver<ClientFrame>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut source) = stream.split();
        let mut ping = tokio::time::interval(self.ping_interval);
        // the first tick completes immediately
        ping.tick().await;

        loop {
            tokio::select! {
                queued = outbound.recv() => {
                    // None means every sender is gone: disconnect() cleared
                    // the slot, treat it as a close request
                    let Some(frame) = queued else { break };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "dropping unserializable frame");
                            continue;
                        }
                    };
                    debug!(event = frame.event_type(), "outbound frame");
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                incoming = source.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(frame) => {
                                    debug!(event = frame.event_type(), "inbound frame");
                                    let _ = self.events.send(TransportEvent::Frame(frame));
                                }
                                Err(e) => {
                                    warn!(error = %e, "ignoring unparseable inbound frame");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            if sink.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket receive failed");
                            break;
                        }
                    }
                }
                _ = ping.tick() => {
                    if sink.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
