//! Client-side state stores
//!
//! This module provides:
//! - `MessageStore` — ordered log of the open conversation
//! - `ConversationDirectory` — the recency-sorted inbox
//!
//! Both are plain synchronous structures; the engine wraps them in
//! `tokio::sync::RwLock` and is the only writer.

pub mod directory;
pub mod messages;

pub use directory::ConversationDirectory;
pub use messages::MessageStore;
