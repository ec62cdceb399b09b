//! Error types for the session layer.

use spyfall_protocol::PlayerId;

/// Errors that can occur while resuming or closing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The resume token doesn't match anything the server issued, or the
    /// session it belonged to has already been swept.
    #[error("invalid resume token")]
    InvalidToken,

    /// The grace period elapsed before the player came back.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),
}
