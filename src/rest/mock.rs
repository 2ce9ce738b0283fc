//! Scripted in-memory chat backend for tests
//!
//! Behaves like the real API from the engine's point of view:
//! - `send_message` issues deterministic ids (`m1`, `m2`, ...) and stamps
//!   the confirmed record with the current time
//! - per-counterpart histories and inbox records are seeded by tests
//! - failure switches turn each endpoint into an HTTP 500
//! - gates hold a history fetch open so tests can interleave responses

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};

use super::traits::ChatApi;
use crate::error::ChatError;
use crate::models::{ConversationRecord, Message};

/// Mock implementation of ChatApi for testing.
///
/// # Example
///
/// ```rust
/// use roomlink_chat::rest::MockChatApi;
/// use roomlink_chat::rest::ChatApi;
///
/// # tokio_test::block_on(async {
/// let api = MockChatApi::new("u1");
/// let sent = api.send_message("u2", "hello").await.unwrap();
/// assert_eq!(sent.id, "m1");
/// assert_eq!(sent.sender_id, "u1");
///
/// // confirmed sends become part of the counterpart's history
/// let history = api.conversation_history("u2").await.unwrap();
/// assert_eq!(history.len(), 1);
/// assert_eq!(history[0].message, "hello");
/// # });
/// ```
pub struct MockChatApi {
    self_id: String,
    pub histories: RwLock<HashMap<String, Vec<Message>>>,
    pub records: RwLock<Vec<ConversationRecord>>,
    pub send_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub fail_sends: AtomicBool,
    pub fail_history: AtomicBool,
    pub fail_list: AtomicBool,
    gates: RwLock<HashMap<String, Arc<Notify>>>,
    send_gate: RwLock<Option<Arc<Notify>>>,
    next_id: AtomicUsize,
}

impl MockChatApi {
    /// `self_id` becomes the senderId of every confirmed send.
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            histories: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            gates: RwLock::new(HashMap::new()),
            send_gate: RwLock::new(None),
            next_id: AtomicUsize::new(1),
        }
    }

    pub async fn seed_history(&self, counterpart_id: &str, messages: Vec<Message>) {
        self.histories
            .write()
            .await
            .insert(counterpart_id.to_string(), messages);
    }

    pub async fn seed_records(&self, records: Vec<ConversationRecord>) {
        *self.records.write().await = records;
    }

    /// Park the next history fetch for `counterpart_id` until the returned
    /// handle is notified. A permit is stored if notified early, so release
    /// order never deadlocks.
    pub async fn gate_history(&self, counterpart_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .write()
            .await
            .insert(counterpart_id.to_string(), Arc::clone(&gate));
        gate
    }

    /// Park the next send until the returned handle is notified.
    pub async fn gate_next_send(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.send_gate.write().await = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, ChatError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.send_gate.write().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChatError::Api {
                status: 500,
                body: "persist rejected".into(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id: format!("m{}", n),
            sender_id: self.self_id.clone(),
            receiver_id: receiver_id.to_string(),
            message: body.to_string(),
            created_at: Utc::now(),
            read: None,
            sender: None,
        };
        self.histories
            .write()
            .await
            .entry(receiver_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn conversation_history(
        &self,
        counterpart_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.write().await.remove(counterpart_id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ChatError::Api {
                status: 500,
                body: "history unavailable".into(),
            });
        }
        Ok(self
            .histories
            .read()
            .await
            .get(counterpart_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn conversations(&self) -> Result<Vec<ConversationRecord>, ChatError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ChatError::Api {
                status: 500,
                body: "inbox unavailable".into(),
            });
        }
        Ok(self.records.read().await.clone())
    }
}
