//! Conversation & message synchronization engine
//!
//! `ChatEngine` composes the session identity, the REST collaborator, the
//! push-channel transport and the two stores behind one facade:
//! - two-phase send pipeline: persist via REST, then broadcast the
//!   confirmed record, with explicit phases and no automatic retry
//! - generation-tagged history fetches so rapid conversation switching
//!   never interleaves a stale response into the visible log
//! - inbound routing: only the open conversation's log grows, but the
//!   directory is patched for every observed message
//! - resync after a reconnect, since frames pushed while offline are gone
//!
//! One instance per authenticated session. All methods take `&self`; the
//! engine is designed to live in an `Arc` shared with the UI layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::events::{EngineEvent, EventBus, SendPhase};
use crate::models::{ConversationRecord, ConversationSummary, Message};
use crate::rest::{ChatApi, HttpChatApi};
use crate::session::SessionIdentity;
use crate::store::{ConversationDirectory, MessageStore};
use crate::transport::{
    ClientFrame, ConnectionState, ServerFrame, Transport, TransportEvent, WsConnectionManager,
};
use crate::Config;

/// Client-side conversation & message synchronization engine.
///
/// Construct with [`ChatEngine::new`] (or [`from_config`](Self::from_config)
/// for the production wiring), call [`start`](Self::start) when the chat
/// surface mounts, and [`shutdown`](Self::shutdown) at logout.
pub struct ChatEngine {
    identity: SessionIdentity,
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn Transport>,
    messages: Arc<RwLock<MessageStore>>,
    directory: Arc<RwLock<ConversationDirectory>>,
    bus: EventBus,
    send_in_flight: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ChatEngine {
    pub fn new(
        identity: SessionIdentity,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            identity,
            api,
            transport,
            messages: Arc::new(RwLock::new(MessageStore::new())),
            directory: Arc::new(RwLock::new(ConversationDirectory::new())),
            bus: EventBus::default(),
            send_in_flight: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Production wiring: reqwest REST client plus the supervised
    /// WebSocket transport, both parameterized from `config`.
    pub fn from_config(config: &Config, identity: SessionIdentity) -> Self {
        let api = Arc::new(HttpChatApi::new(
            &config.api_url,
            config.api_token.clone(),
            config.request_timeout,
        ));
        let transport = Arc::new(WsConnectionManager::new(
            &config.socket_url,
            &identity.id,
            config.reconnect_delay,
            config.ping_interval,
        ));
        Self::new(identity, api, transport)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bring the engine up: load the directory, then subscribe to the
    /// transport and open the push channel (which announces presence).
    ///
    /// A failed directory fetch is recorded and published but does not
    /// abort startup; the listener retries it as a full resync when the
    /// push channel first connects.
    pub async fn start(&self) -> Result<(), ChatError> {
        // the fetch runs before connect(), so by the time any Connected
        // can arrive the listener knows whether the initial load landed
        let initial_fetch_failed = match self.refresh_directory().await {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "initial directory fetch failed");
                true
            }
        };
        self.spawn_listener(initial_fetch_failed).await;
        self.transport.connect().await?;
        info!(user_id = %self.identity.id, "chat engine started");
        Ok(())
    }

    /// Tear everything down at logout. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        self.transport.disconnect().await;
        self.messages.write().await.clear();
        self.directory.write().await.clear();
        info!("chat engine shut down");
    }

    /// Subscribe to engine events. Any number of subscribers may attach.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// True when this session authored the message.
    pub fn is_mine(&self, message: &Message) -> bool {
        self.identity.owns(&message.sender_id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Open (or re-open) the conversation with `counterpart_id`: clears its
    /// unread count and loads the authoritative history. Switching away
    /// from another conversation blanks the log immediately; re-opening the
    /// same one keeps the current transcript until the response lands.
    pub async fn open_conversation(&self, counterpart_id: &str) -> Result<(), ChatError> {
        debug!(counterpart_id, "opening conversation");
        self.directory.write().await.clear_unread(counterpart_id);
        load_history_inner(self.api.as_ref(), &self.messages, &self.bus, counterpart_id).await
    }

    /// Send `body` to `counterpart_id` through the two-phase pipeline.
    ///
    /// Persist first; only a confirmed record is broadcast and folded into
    /// local state. On persist failure nothing is committed and the error
    /// is returned so the caller can keep the user's input. A broadcast
    /// failure after a successful persist still commits: the message is
    /// durable and the counterpart reconciles on its next fetch.
    pub async fn send_message(
        &self,
        counterpart_id: &str,
        body: &str,
    ) -> Result<Message, ChatError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.send_in_flight.swap(true, Ordering::SeqCst) {
            return Err(ChatError::SendInFlight);
        }
        let _guard = SendGuard(&self.send_in_flight);
        self.publish_phase(counterpart_id, SendPhase::Composing);

        self.publish_phase(counterpart_id, SendPhase::Persisting);
        let confirmed = match self.api.send_message(counterpart_id, trimmed).await {
            Ok(message) => message,
            Err(e) => {
                self.publish_phase(counterpart_id, SendPhase::Failed);
                self.bus.publish(EngineEvent::SendFailed {
                    counterpart_id: counterpart_id.to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.publish_phase(counterpart_id, SendPhase::Broadcasting);
        if let Err(e) = self
            .transport
            .emit(ClientFrame::MessageSend(confirmed.clone()))
            .await
        {
            // already durable server-side; the counterpart catches up on
            // its next history fetch
            warn!(error = %e, message_id = %confirmed.id, "live broadcast failed");
        }

        let open = {
            let mut store = self.messages.write().await;
            let open = store.active_counterpart().map(str::to_string);
            if open.as_deref() == Some(counterpart_id) {
                store.add_message(confirmed.clone());
            }
            open
        };
        self.directory
            .write()
            .await
            .apply_message(&confirmed, &self.identity.id, open.as_deref());

        self.publish_phase(counterpart_id, SendPhase::Committed);
        self.bus.publish(EngineEvent::MessageCommitted {
            message: confirmed.clone(),
        });
        info!(message_id = %confirmed.id, receiver_id = %counterpart_id, "message sent");
        Ok(confirmed)
    }

    /// Replace the directory with a fresh backend aggregate.
    pub async fn refresh_directory(&self) -> Result<(), ChatError> {
        refresh_directory_inner(self.api.as_ref(), &self.directory, &self.bus).await
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Transcript of the open conversation, oldest first.
    pub async fn conversation_snapshot(&self) -> Vec<Message> {
        self.messages.read().await.messages().to_vec()
    }

    /// Inbox entries, most recent activity first.
    pub async fn directory_snapshot(&self) -> Vec<ConversationSummary> {
        self.directory.read().await.entries().to_vec()
    }

    pub async fn active_counterpart(&self) -> Option<String> {
        self.messages
            .read()
            .await
            .active_counterpart()
            .map(str::to_string)
    }

    pub async fn total_unread(&self) -> u32 {
        self.directory.read().await.total_unread()
    }

    pub async fn history_error(&self) -> Option<String> {
        self.messages.read().await.last_error().map(str::to_string)
    }

    pub async fn directory_error(&self) -> Option<String> {
        self.directory.read().await.last_error().map(str::to_string)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn publish_phase(&self, counterpart_id: &str, phase: SendPhase) {
        self.bus.publish(EngineEvent::SendStateChanged {
            counterpart_id: counterpart_id.to_string(),
            phase,
        });
    }

    /// `resync_on_connect` arms the listener's resync latch from the
    /// first Connected, for when the startup fetch did not land.
    async fn spawn_listener(&self, resync_on_connect: bool) {
        let mut slot = self.listener.lock().await;
        if slot.is_some() {
            return;
        }
        let ctx = ListenerCtx {
            my_id: self.identity.id.clone(),
            api: Arc::clone(&self.api),
            messages: Arc::clone(&self.messages),
            directory: Arc::clone(&self.directory),
            bus: self.bus.clone(),
        };
        // subscribe before connect() so the first Connected is never missed
        let events = self.transport.subscribe();
        *slot = Some(tokio::spawn(run_listener(ctx, events, resync_on_connect)));
    }
}

/// Releases the in-flight flag on every exit path of `send_message`.
struct SendGuard<'a>(&'a AtomicBool);

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Transport listener
// ============================================================================

/// Everything the spawned listener needs, detached from `&self` lifetimes.
struct ListenerCtx {
    my_id: String,
    api: Arc<dyn ChatApi>,
    messages: Arc<RwLock<MessageStore>>,
    directory: Arc<RwLock<ConversationDirectory>>,
    bus: EventBus,
}

async fn run_listener(
    ctx: ListenerCtx,
    mut events: broadcast::Receiver<TransportEvent>,
    mut resync_armed: bool,
) {
    // start()'s own fetch covers the first Connected, so the latch comes
    // pre-armed only when that fetch failed; every later Connected means
    // the connection dropped and recovered
    loop {
        match events.recv().await {
            Ok(TransportEvent::Connected) => {
                ctx.bus
                    .publish(EngineEvent::ConnectionChanged { connected: true });
                if resync_armed {
                    resync(&ctx).await;
                } else {
                    resync_armed = true;
                }
            }
            Ok(TransportEvent::Disconnected) => {
                ctx.bus
                    .publish(EngineEvent::ConnectionChanged { connected: false });
            }
            Ok(TransportEvent::Frame(frame)) => handle_frame(&ctx, frame).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "listener lagged behind transport events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("engine listener stopped");
}

async fn handle_frame(ctx: &ListenerCtx, frame: ServerFrame) {
    match frame {
        ServerFrame::MessageReceive(message) => {
            let counterpart = message.counterpart_of(&ctx.my_id).to_string();
            // check and insert under one lock: a concurrent switch must
            // not slip between them and leave this message in the next
            // conversation's log
            let open = {
                let mut store = ctx.messages.write().await;
                let open = store.active_counterpart().map(str::to_string);
                if open.as_deref() == Some(counterpart.as_str())
                    && !store.add_message(message.clone())
                {
                    debug!(message_id = %message.id, "duplicate delivery ignored");
                }
                open
            };
            ctx.directory
                .write()
                .await
                .apply_message(&message, &ctx.my_id, open.as_deref());
            ctx.bus.publish(EngineEvent::MessageReceived { message });
        }
        ServerFrame::MessageRead(receipt) => {
            let marked = ctx.messages.write().await.mark_read_by(&receipt.user_id);
            debug!(user_id = %receipt.user_id, marked, "read receipt applied");
            ctx.bus.publish(EngineEvent::ReadReceipt {
                user_id: receipt.user_id,
            });
        }
        ServerFrame::NotificationReceive(payload) => {
            ctx.bus.publish(EngineEvent::Notification { payload });
        }
    }
}

/// Frames pushed while the connection was down are gone for good, so a
/// recovered connection refetches both stores.
async fn resync(ctx: &ListenerCtx) {
    info!("push channel restored; resynchronizing");
    if let Err(e) = refresh_directory_inner(ctx.api.as_ref(), &ctx.directory, &ctx.bus).await {
        warn!(error = %e, "directory resync failed");
    }
    let open = ctx
        .messages
        .read()
        .await
        .active_counterpart()
        .map(str::to_string);
    if let Some(counterpart_id) = open {
        if let Err(e) =
            load_history_inner(ctx.api.as_ref(), &ctx.messages, &ctx.bus, &counterpart_id).await
        {
            warn!(error = %e, counterpart_id = %counterpart_id, "history resync failed");
        }
    }
}

// ============================================================================
// Shared fetch paths
// ============================================================================

async fn load_history_inner(
    api: &dyn ChatApi,
    messages: &RwLock<MessageStore>,
    bus: &EventBus,
    counterpart_id: &str,
) -> Result<(), ChatError> {
    let gen = messages.write().await.begin_fetch(counterpart_id);
    match api.conversation_history(counterpart_id).await {
        Ok(history) => {
            let mut store = messages.write().await;
            if store.apply_history(gen, history) {
                let count = store.len();
                drop(store);
                bus.publish(EngineEvent::HistoryLoaded {
                    counterpart_id: counterpart_id.to_string(),
                    count,
                });
            }
            Ok(())
        }
        Err(e) => {
            let current = messages
                .write()
                .await
                .record_fetch_error(gen, &e.to_string());
            if current {
                bus.publish(EngineEvent::HistoryFailed {
                    counterpart_id: counterpart_id.to_string(),
                    error: e.to_string(),
                });
            }
            Err(e)
        }
    }
}

async fn refresh_directory_inner(
    api: &dyn ChatApi,
    directory: &RwLock<ConversationDirectory>,
    bus: &EventBus,
) -> Result<(), ChatError> {
    match api.conversations().await {
        Ok(records) => {
            let summaries: Vec<ConversationSummary> = records
                .into_iter()
                .map(ConversationRecord::into_summary)
                .collect();
            let count = summaries.len();
            directory.write().await.replace(summaries);
            bus.publish(EngineEvent::DirectoryRefreshed { count });
            Ok(())
        }
        Err(e) => {
            directory.write().await.record_fetch_error(&e.to_string());
            bus.publish(EngineEvent::DirectoryFailed {
                error: e.to_string(),
            });
            Err(e)
        }
    }
}
