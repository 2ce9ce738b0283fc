//! Chat data model
//!
//! Wire shapes exchanged with the backend (camelCase JSON) and the flat
//! client-side shapes derived from them:
//! - `Message`: one persisted chat message, used on both REST and socket
//! - `ConversationRecord`: nested inbox row as the backend returns it
//! - `ConversationSummary`: the reshaped row the directory and UI consume

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Wire shapes
// ============================================================================

/// Minimal user profile embedded in chat payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A chat message as persisted by the backend.
///
/// `id` and `created_at` are server-assigned; clients never fabricate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-issued identifier, unique across the system.
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Body text.
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Read flag, when the backend tracks it for this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    /// Populated sender profile, when the backend joins it in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserRef>,
}

impl Message {
    /// The other participant from `my_id`'s point of view.
    pub fn counterpart_of(&self, my_id: &str) -> &str {
        if self.sender_id == my_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    /// Ordering key used by the message log: creation time, then id as the
    /// tie-break so same-instant messages order deterministically.
    pub fn ordering_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

/// Body of `POST /chat/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub message: String,
}

/// `lastMessage` sub-object of an inbox row. Only `message` is guaranteed;
/// id and timestamp are used for ordering when the backend includes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageRef {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One element of `GET /chat/conversations`, exactly as the backend shapes
/// it: the counterpart's profile, the latest message, and how many inbound
/// messages are unread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub user: UserRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessageRef>,
    #[serde(default)]
    pub unread_count: u32,
}

// ============================================================================
// Client-side shapes
// ============================================================================

/// Flat inbox row consumed by the directory and any UI on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub counterpart_id: String,
    pub display_name: String,
    pub avatar: Option<String>,
    /// Preview text of the most recent message.
    pub last_message: String,
    pub last_message_id: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

impl ConversationRecord {
    /// Reshape the nested backend record into the flat client shape.
    ///
    /// A missing `lastMessage` maps to an empty preview; an empty display
    /// name falls back to the counterpart id so rows are never blank.
    pub fn into_summary(self) -> ConversationSummary {
        let ConversationRecord {
            user,
            last_message,
            unread_count,
        } = self;
        let last = last_message.unwrap_or_default();
        let display_name = if user.full_name.is_empty() {
            user.id.clone()
        } else {
            user.full_name
        };
        ConversationSummary {
            counterpart_id: user.id,
            display_name,
            avatar: user.avatar,
            last_message: last.message,
            last_message_id: last.id,
            last_activity: last.created_at,
            unread_count,
        }
    }
}
