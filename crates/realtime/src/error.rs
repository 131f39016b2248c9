//! Error types for the realtime session client.

use thiserror::Error;

/// Failures surfaced by the session client.
///
/// Every variant is terminal for the current attempt. Nothing is retried
/// internally; the caller retries by invoking `connect()` again.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The credential endpoint returned a non-success status or a body
    /// without a usable client secret.
    #[error("credential fetch failed: {0}")]
    Credential(String),

    /// Microphone or speaker access could not be established.
    #[error("media access failed: {0}")]
    MediaAccess(String),

    /// WebSocket negotiation with the realtime service failed.
    #[error("transport negotiation failed: {0}")]
    Transport(String),

    /// The realtime service reported an error mid-session.
    #[error("server error: {0}")]
    Server(String),

    /// `connect()` was called while a session was already running.
    #[error("a realtime session is already active; disconnect it first")]
    AlreadyActive,

    /// The connect attempt was cancelled by `disconnect()`.
    #[error("connect was cancelled")]
    Cancelled,
}
