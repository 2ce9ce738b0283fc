//! Engine event system for real-time UI notifications
//!
//! This module provides:
//! - `EngineEvent` — typed events published as the engine's state changes
//! - `SendPhase` — the per-send pipeline state surfaced to the UI
//! - `EventBus` — broadcast channel for distributing events to subscribers

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{EngineEvent, SendPhase};
