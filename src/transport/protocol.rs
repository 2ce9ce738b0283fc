//! Wire frames for the chat push channel
//!
//! Every frame is a JSON envelope `{"event": "...", "data": ...}`. Event
//! names mirror the backend's socket contract:
//! - client emits `user:join` (presence) and `message:send` (live delivery)
//! - server pushes `message:receive`, `message:read`, `notification:receive`
//!
//! The `message:send` data is the full confirmed record from the REST
//! persist call: it already carries the server-assigned id and receiverId,
//! which is all the server needs to route it, so no separate broadcast
//! shape exists.

use crate::models::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames emitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    /// Presence announcement; data is the bare user id.
    #[serde(rename = "user:join")]
    UserJoin(String),
    /// Live delivery of a confirmed message record.
    #[serde(rename = "message:send")]
    MessageSend(Message),
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    /// A message addressed to (or echoed back at) this session.
    #[serde(rename = "message:receive")]
    MessageReceive(Message),
    /// Advisory: the given user has read this session's messages.
    #[serde(rename = "message:read")]
    MessageRead(ReadReceipt),
    /// Opaque notification payload; the engine does not interpret it.
    #[serde(rename = "notification:receive")]
    NotificationReceive(Value),
}

/// Data of a `message:read` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: String,
}

impl ClientFrame {
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientFrame::UserJoin(_) => "user:join",
            ClientFrame::MessageSend(_) => "message:send",
        }
    }
}

impl ServerFrame {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerFrame::MessageReceive(_) => "message:receive",
            ServerFrame::MessageRead(_) => "message:read",
            ServerFrame::NotificationReceive(_) => "notification:receive",
        }
    }
}
