//! Crate-wide error type
//!
//! Network failures are converted into `ChatError` at the collaborator
//! boundary (REST client, transport) so a transient fault can never poison
//! store state or escape as a panic.

use thiserror::Error;

/// Errors surfaced by the chat engine and its collaborators.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Message body was empty or whitespace-only. Rejected before any
    /// network call is made.
    #[error("message body is empty")]
    EmptyMessage,

    /// A send is already persisting; the same input must not be submitted
    /// twice.
    #[error("a send is already in flight")]
    SendInFlight,

    /// No live push-channel connection.
    #[error("transport is not connected")]
    NotConnected,

    /// HTTP request failed before producing a response (connect, timeout,
    /// undecodable body).
    #[error("chat API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Chat API answered with a non-success status.
    #[error("chat API returned {status}: {body}")]
    Api { status: u16, body: String },
}
