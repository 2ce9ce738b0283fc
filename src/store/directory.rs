//! Conversation directory (the inbox)
//!
//! One entry per counterpart the session has ever exchanged messages with,
//! kept in recency order. Refreshed wholesale from the backend aggregate
//! and patched locally as individual messages are observed, so the row a
//! user is looking at never waits for a refetch.

use tracing::debug;

use crate::models::{ConversationSummary, Message};

/// Recency-ordered inbox entries.
#[derive(Debug, Default)]
pub struct ConversationDirectory {
    entries: Vec<ConversationSummary>,
    last_error: Option<String>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, most recent activity first.
    pub fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    pub fn entry(&self, counterpart_id: &str) -> Option<&ConversationSummary> {
        self.entries.iter().find(|e| e.counterpart_id == counterpart_id)
    }

    /// Most recent refresh failure, cleared by the next successful replace.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn total_unread(&self) -> u32 {
        self.entries.iter().map(|e| e.unread_count).sum()
    }

    /// Replace all entries with a fresh backend aggregate.
    pub fn replace(&mut self, summaries: Vec<ConversationSummary>) {
        self.entries = summaries;
        self.last_error = None;
        self.resort();
    }

    /// Record a refresh failure; previous entries stay usable.
    pub fn record_fetch_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    /// Fold one observed message (sent or received) into the entry for its
    /// counterpart, creating the entry when this is a brand-new exchange.
    ///
    /// Unread count is bumped only for inbound messages to a conversation
    /// that is not currently open. A message older than the entry's last
    /// activity still bumps unread but never regresses the preview.
    pub fn apply_message(
        &mut self,
        message: &Message,
        my_id: &str,
        open_counterpart: Option<&str>,
    ) {
        let counterpart = message.counterpart_of(my_id).to_string();
        let inbound = message.sender_id != my_id;
        let bump = inbound && open_counterpart != Some(counterpart.as_str());

        match self
            .entries
            .iter_mut()
            .find(|e| e.counterpart_id == counterpart)
        {
            Some(entry) => {
                if bump {
                    entry.unread_count += 1;
                }
                let newer = entry
                    .last_activity
                    .map(|t| message.created_at >= t)
                    .unwrap_or(true);
                if newer {
                    entry.last_message = message.message.clone();
                    entry.last_message_id = Some(message.id.clone());
                    entry.last_activity = Some(message.created_at);
                    if inbound {
                        if let Some(sender) = &message.sender {
                            if !sender.full_name.is_empty() {
                                entry.display_name = sender.full_name.clone();
                            }
                            if sender.avatar.is_some() {
                                entry.avatar = sender.avatar.clone();
                            }
                        }
                    }
                } else {
                    debug!(
                        message_id = %message.id,
                        counterpart = %counterpart,
                        "older message does not displace directory preview"
                    );
                }
            }
            None => {
                let (display_name, avatar) = match &message.sender {
                    Some(sender) if inbound && !sender.full_name.is_empty() => {
                        (sender.full_name.clone(), sender.avatar.clone())
                    }
                    // outbound to someone new, or no profile attached: the
                    // id stands in until the next directory refresh
                    _ => (counterpart.clone(), None),
                };
                self.entries.push(ConversationSummary {
                    counterpart_id: counterpart,
                    display_name,
                    avatar,
                    last_message: message.message.clone(),
                    last_message_id: Some(message.id.clone()),
                    last_activity: Some(message.created_at),
                    unread_count: if bump { 1 } else { 0 },
                });
            }
        }
        self.resort();
    }

    /// The user opened this conversation; its inbound messages are now seen.
    pub fn clear_unread(&mut self, counterpart_id: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.counterpart_id == counterpart_id)
        {
            entry.unread_count = 0;
        }
    }

    /// Drop all state. Used at session teardown.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Recency order: last activity descending, then last message id
    /// descending for same-instant entries, stable otherwise. Entries with
    /// no activity at all sort last.
    fn resort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| b.last_message_id.cmp(&a.last_message_id))
        });
    }
}
