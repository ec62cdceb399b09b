//! Error types for the room layer.

use spyfall_protocol::{PlayerId, RoomCode};

/// Errors that can occur during room operations.
///
/// Every variant is recoverable: the command that caused it is rejected and
/// the room is left unchanged. The `Display` text is what the caller sees in
/// its `errorMessage`.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Missing or malformed player name, room code, settings or vote target.
    #[error("{0}")]
    InvalidInput(String),

    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// A non-host attempted a host-only action.
    #[error("only the host can {0}")]
    Unauthorized(&'static str),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("at least {needed} connected players are needed to start (have {connected})")]
    NotEnoughPlayers { needed: usize, connected: usize },

    #[error("a game is already in progress in room {0}")]
    GameInProgress(RoomCode),

    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomCode),

    /// An operation would break the room's phase cycle.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Every code drawn from the code source was already live.
    #[error("no free room codes available")]
    NoFreeCodes,

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}
