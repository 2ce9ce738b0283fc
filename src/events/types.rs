//! Engine event definitions
//!
//! Everything a UI needs to observe the engine is published as an
//! `EngineEvent`: connectivity transitions, message arrivals, send pipeline
//! phases, and store refresh outcomes. Events are notifications; durable
//! state is read from the store snapshots.

use crate::models::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase of the send pipeline for one outgoing message.
///
/// `Composing -> Persisting -> Broadcasting -> Committed`, with `Failed` as
/// the terminal branch when the persist call rejects. There is no automatic
/// retry; a failed send returns to the user's hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPhase {
    Composing,
    Persisting,
    Broadcasting,
    Committed,
    Failed,
}

/// Events published by the engine for UI consumption.
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Push-channel connectivity changed.
    ConnectionChanged { connected: bool },
    /// An inbound message was delivered over the push channel.
    MessageReceived { message: Message },
    /// An outgoing message was confirmed and folded into local state.
    MessageCommitted { message: Message },
    /// Send pipeline transition for the given counterpart.
    SendStateChanged {
        counterpart_id: String,
        phase: SendPhase,
    },
    /// The persist phase rejected; nothing was committed or broadcast.
    SendFailed {
        counterpart_id: String,
        error: String,
    },
    /// History fetch applied for the open conversation.
    HistoryLoaded {
        counterpart_id: String,
        count: usize,
    },
    /// History fetch failed; the previous log is retained.
    HistoryFailed {
        counterpart_id: String,
        error: String,
    },
    /// Directory replaced wholesale from the backend.
    DirectoryRefreshed { count: usize },
    /// Directory refresh failed; previous entries are retained.
    DirectoryFailed { error: String },
    /// Advisory read receipt from the given user.
    ReadReceipt { user_id: String },
    /// Opaque notification payload, forwarded as-is.
    Notification { payload: Value },
}

impl EngineEvent {
    /// Stable discriminant for logging and UI routing.
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::ConnectionChanged { .. } => "connection_changed",
            EngineEvent::MessageReceived { .. } => "message_received",
            EngineEvent::MessageCommitted { .. } => "message_committed",
            EngineEvent::SendStateChanged { .. } => "send_state_changed",
            EngineEvent::SendFailed { .. } => "send_failed",
            EngineEvent::HistoryLoaded { .. } => "history_loaded",
            EngineEvent::HistoryFailed { .. } => "history_failed",
            EngineEvent::DirectoryRefreshed { .. } => "directory_refreshed",
            EngineEvent::DirectoryFailed { .. } => "directory_failed",
            EngineEvent::ReadReceipt { .. } => "read_receipt",
            EngineEvent::Notification { .. } => "notification",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let event = EngineEvent::ConnectionChanged { connected: true };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.event_type());
        assert_eq!(value["connected"], true);

        let event = EngineEvent::SendStateChanged {
            counterpart_id: "u2".into(),
            phase: SendPhase::Persisting,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "send_state_changed");
        assert_eq!(value["phase"], "persisting");
    }

    #[test]
    fn test_notification_carries_opaque_payload() {
        let event = EngineEvent::Notification {
            payload: json!({ "kind": "booking_request", "listingId": "l42" }),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["listingId"], "l42");

        let back: EngineEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.event_type(), "notification");
    }

    #[test]
    fn test_send_phase_round_trips() {
        for phase in [
            SendPhase::Composing,
            SendPhase::Persisting,
            SendPhase::Broadcasting,
            SendPhase::Committed,
            SendPhase::Failed,
        ] {
            let text = serde_json::to_string(&phase).unwrap();
            let back: SendPhase = serde_json::from_str(&text).unwrap();
            assert_eq!(back, phase);
        }
        assert_eq!(
            serde_json::to_string(&SendPhase::Broadcasting).unwrap(),
            "\"broadcasting\""
        );
    }
}
