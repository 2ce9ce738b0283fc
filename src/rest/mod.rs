//! Chat REST collaborator
//!
//! This module provides:
//! - `ChatApi` — the trait the engine persists and fetches through
//! - `HttpChatApi` — reqwest implementation against the real backend
//! - `MockChatApi` — scripted in-memory backend for tests

pub mod client;
pub mod mock;
pub mod traits;

pub use client::HttpChatApi;
pub use mock::MockChatApi;
pub use traits::ChatApi;
