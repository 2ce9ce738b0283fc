//! Message log for the open conversation
//!
//! Holds the ordered transcript of exactly one conversation at a time.
//! Two ingestion paths with different semantics:
//! - `apply_history`: authoritative full replace from a REST fetch
//! - `add_message`: incremental insert from live delivery or a local send,
//!   deduplicated by server id so echoes are harmless
//!
//! History fetches are generation-tagged: each `begin_fetch` invalidates
//! every response still in flight, so rapid conversation switching can
//! never interleave an older counterpart's history into the visible log.

use std::collections::HashSet;

use tracing::debug;

use crate::models::Message;

/// Ordered log for the currently open conversation.
#[derive(Debug, Default)]
pub struct MessageStore {
    active: Option<String>,
    log: Vec<Message>,
    fetch_gen: u64,
    last_error: Option<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counterpart id of the conversation currently on screen.
    pub fn active_counterpart(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Most recent fetch failure, cleared by the next successful apply.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Register an in-flight history fetch and return its generation tag.
    ///
    /// Switching to a different counterpart clears the visible log
    /// immediately so the previous conversation never flashes under the
    /// new one. Re-fetching the already-open counterpart keeps the log on
    /// screen until the response lands.
    pub fn begin_fetch(&mut self, counterpart_id: &str) -> u64 {
        if self.active.as_deref() != Some(counterpart_id) {
            self.log.clear();
            self.last_error = None;
            self.active = Some(counterpart_id.to_string());
        }
        self.fetch_gen += 1;
        self.fetch_gen
    }

    /// Replace the log with an authoritative history.
    ///
    /// Returns false (and changes nothing) when `gen` is not the newest
    /// fetch generation: the response raced with a later `begin_fetch` and
    /// must be discarded. An empty history is a valid result.
    pub fn apply_history(&mut self, gen: u64, mut messages: Vec<Message>) -> bool {
        if gen != self.fetch_gen {
            debug!(gen, current = self.fetch_gen, "discarding stale history response");
            return false;
        }
        let mut seen = HashSet::with_capacity(messages.len());
        messages.retain(|m| seen.insert(m.id.clone()));
        messages.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
        self.log = messages;
        self.last_error = None;
        true
    }

    /// Record a fetch failure. The previous log is retained so the user
    /// keeps whatever transcript they had. Stale failures are ignored.
    pub fn record_fetch_error(&mut self, gen: u64, error: &str) -> bool {
        if gen != self.fetch_gen {
            return false;
        }
        self.last_error = Some(error.to_string());
        true
    }

    /// Insert one message at its `(created_at, id)` position.
    ///
    /// Returns false when a message with the same id is already present;
    /// the log is unchanged in that case.
    pub fn add_message(&mut self, message: Message) -> bool {
        if self.log.iter().any(|m| m.id == message.id) {
            return false;
        }
        let pos = {
            let key = message.ordering_key();
            self.log.partition_point(|m| m.ordering_key() <= key)
        };
        self.log.insert(pos, message);
        true
    }

    /// Apply a read receipt: everything this session sent to `reader_id`
    /// is now read. Returns how many messages were newly marked.
    pub fn mark_read_by(&mut self, reader_id: &str) -> usize {
        let mut marked = 0;
        for message in &mut self.log {
            if message.receiver_id == reader_id && message.read != Some(true) {
                message.read = Some(true);
                marked += 1;
            }
        }
        marked
    }

    /// Drop all state. Used at session teardown.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn msg(id: &str, from: &str, to: &str, body: &str, at: &str) -> Message {
        Message {
            id: id.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            message: body.into(),
            created_at: ts(at),
            read: None,
            sender: None,
        }
    }

    #[test]
    fn test_add_message_is_idempotent_per_id() {
        let mut store = MessageStore::new();
        store.begin_fetch("u2");

        let m = msg("m1", "u1", "u2", "Hi", "2024-05-01T10:00:00Z");
        assert!(store.add_message(m.clone()));
        assert!(!store.add_message(m));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_message_inserts_in_timestamp_order() {
        let mut store = MessageStore::new();
        store.begin_fetch("u2");

        store.add_message(msg("m3", "u1", "u2", "third", "2024-05-01T10:02:00Z"));
        store.add_message(msg("m1", "u1", "u2", "first", "2024-05-01T10:00:00Z"));
        store.add_message(msg("m2", "u2", "u1", "second", "2024-05-01T10:01:00Z"));

        let ids: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[test]
    fn test_same_timestamp_orders_by_id() {
        let mut store = MessageStore::new();
        store.begin_fetch("u2");

        store.add_message(msg("m2", "u1", "u2", "b", "2024-05-01T10:00:00Z"));
        store.add_message(msg("m1", "u2", "u1", "a", "2024-05-01T10:00:00Z"));

        let ids: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn test_apply_history_fully_replaces_log() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.add_message(msg("stale", "u1", "u2", "old", "2024-05-01T09:00:00Z"));

        let applied = store.apply_history(
            gen,
            vec![
                msg("m2", "u2", "u1", "two", "2024-05-01T10:01:00Z"),
                msg("m1", "u1", "u2", "one", "2024-05-01T10:00:00Z"),
            ],
        );
        assert!(applied);
        let ids: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let mut store = MessageStore::new();
        let old_gen = store.begin_fetch("u2");
        let new_gen = store.begin_fetch("u3");

        // the response for u2 lands after the user switched to u3
        assert!(!store.apply_history(
            old_gen,
            vec![msg("m1", "u2", "u1", "late", "2024-05-01T10:00:00Z")]
        ));
        assert!(store.is_empty());
        assert_eq!(store.active_counterpart(), Some("u3"));

        assert!(store.apply_history(
            new_gen,
            vec![msg("m9", "u3", "u1", "current", "2024-05-01T11:00:00Z")]
        ));
        assert_eq!(store.messages()[0].id, "m9");
    }

    #[test]
    fn test_switching_counterpart_clears_log_immediately() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.apply_history(gen, vec![msg("m1", "u2", "u1", "hi", "2024-05-01T10:00:00Z")]);

        store.begin_fetch("u3");
        assert!(store.is_empty());
    }

    #[test]
    fn test_refreshing_same_counterpart_keeps_log_until_response() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.apply_history(gen, vec![msg("m1", "u2", "u1", "hi", "2024-05-01T10:00:00Z")]);

        store.begin_fetch("u2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_history_is_a_valid_result() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        assert!(store.apply_history(gen, vec![]));
        assert!(store.is_empty());
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_fetch_error_keeps_previous_log() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.apply_history(gen, vec![msg("m1", "u2", "u1", "hi", "2024-05-01T10:00:00Z")]);

        let retry = store.begin_fetch("u2");
        assert!(store.record_fetch_error(retry, "timeout"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_error(), Some("timeout"));

        // next successful apply clears the error
        let again = store.begin_fetch("u2");
        store.apply_history(again, vec![]);
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_stale_fetch_error_is_ignored() {
        let mut store = MessageStore::new();
        let old_gen = store.begin_fetch("u2");
        store.begin_fetch("u3");
        assert!(!store.record_fetch_error(old_gen, "timeout"));
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_duplicate_ids_in_history_are_collapsed() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.apply_history(
            gen,
            vec![
                msg("m1", "u1", "u2", "one", "2024-05-01T10:00:00Z"),
                msg("m1", "u1", "u2", "one", "2024-05-01T10:00:00Z"),
            ],
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_read_by_flags_only_messages_to_reader() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.apply_history(
            gen,
            vec![
                msg("m1", "u1", "u2", "mine", "2024-05-01T10:00:00Z"),
                msg("m2", "u2", "u1", "theirs", "2024-05-01T10:01:00Z"),
            ],
        );

        assert_eq!(store.mark_read_by("u2"), 1);
        assert_eq!(store.messages()[0].read, Some(true));
        assert_eq!(store.messages()[1].read, None);
        // already marked, nothing new
        assert_eq!(store.mark_read_by("u2"), 0);
        // a reader this session never wrote to is a no-op
        assert_eq!(store.mark_read_by("u9"), 0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut store = MessageStore::new();
        let gen = store.begin_fetch("u2");
        store.apply_history(gen, vec![msg("m1", "u2", "u1", "hi", "2024-05-01T10:00:00Z")]);

        store.clear();
        assert!(store.is_empty());
        assert!(store.active_counterpart().is_none());
    }
}
