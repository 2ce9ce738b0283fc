//! Push-channel transport
//!
//! This module provides:
//! - `ClientFrame` / `ServerFrame` — the JSON wire protocol
//! - `Transport` — the seam the engine talks through
//! - `WsConnectionManager` — supervised WebSocket implementation
//! - `MockTransport` — in-memory double for tests

pub mod manager;
pub mod mock;
pub mod protocol;

pub use manager::{ConnectionState, Transport, TransportEvent, WsConnectionManager};
pub use mock::MockTransport;
pub use protocol::{ClientFrame, ReadReceipt, ServerFrame};
