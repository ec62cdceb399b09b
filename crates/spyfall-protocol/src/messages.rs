//! Game commands and events.
//!
//! Both enums are adjacently tagged with camelCase names so a browser client
//! sees `{ "event": "castVote", "data": { "roomCode": "12345", "targetId": 3 } }`.

use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoomCode};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Host-editable room settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub max_players: usize,
    pub game_time_minutes: u32,
    pub spies_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_players: 8,
            game_time_minutes: 5,
            spies_count: 1,
        }
    }
}

impl Settings {
    /// Length of one round in seconds.
    pub fn round_seconds(&self) -> u32 {
        self.game_time_minutes.saturating_mul(60)
    }

    /// Returns a copy with every field present in `patch` overwritten.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            max_players: patch.max_players.unwrap_or(self.max_players),
            game_time_minutes: patch.game_time_minutes.unwrap_or(self.game_time_minutes),
            spies_count: patch.spies_count.unwrap_or(self.spies_count),
        }
    }
}

/// A partial settings update. Missing fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub max_players: Option<usize>,
    pub game_time_minutes: Option<u32>,
    pub spies_count: Option<usize>,
}

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// A roster entry as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Spy,
    Civilian,
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Two or more players shared the top vote count; the spies escape.
    Tie,
    /// The single most-voted player was a spy.
    CiviliansWin,
    /// The single most-voted player was innocent.
    SpyWins,
}

impl Outcome {
    pub fn spy_wins(self) -> bool {
        !matches!(self, Self::CiviliansWin)
    }
}

/// One line of the post-game vote reveal, by display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReveal {
    pub voter: String,
    pub target: String,
}

/// Payload of `gameOver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub outcome: Outcome,
    pub message: String,
    pub spy_wins: bool,
    pub spies: Vec<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accused_player: Option<String>,
    pub votes: Vec<VoteReveal>,
}

// ---------------------------------------------------------------------------
// ClientCommand
// ---------------------------------------------------------------------------

/// Commands a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    CreateRoom {
        player_name: String,
    },
    JoinRoom {
        room_code: RoomCode,
        player_name: String,
    },
    /// Host only.
    UpdateSettings {
        room_code: RoomCode,
        settings: SettingsPatch,
    },
    /// Host only.
    StartGame {
        room_code: RoomCode,
    },
    SendMessage {
        room_code: RoomCode,
        message: String,
    },
    CastVote {
        room_code: RoomCode,
        target_id: PlayerId,
    },
    LeaveRoom {
        room_code: RoomCode,
    },
    /// Host only: return an ended room to the lobby.
    ResetRoom {
        room_code: RoomCode,
    },
}

impl ClientCommand {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "createRoom",
            Self::JoinRoom { .. } => "joinRoom",
            Self::UpdateSettings { .. } => "updateSettings",
            Self::StartGame { .. } => "startGame",
            Self::SendMessage { .. } => "sendMessage",
            Self::CastVote { .. } => "castVote",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::ResetRoom { .. } => "resetRoom",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Events the server sends to clients. The core produces these and the
/// gateway delivers them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RoomCreated {
        room_code: RoomCode,
        is_host: bool,
        settings: Settings,
    },
    RoomJoined {
        room_code: RoomCode,
        player_name: String,
        is_host: bool,
        settings: Settings,
    },
    UpdatePlayers {
        players: Vec<PlayerView>,
        host: String,
        host_id: PlayerId,
    },
    SettingsUpdated {
        settings: Settings,
    },
    CanStartGame {
        can_start: bool,
    },
    ErrorMessage {
        message: String,
    },
    GameStarted {
        role: Role,
        location: String,
        all_locations: Vec<String>,
        timer: u32,
    },
    StartTimer {
        seconds: u32,
    },
    UpdateTimer {
        seconds: u32,
    },
    StartVoting {},
    PlayerVoted {
        voter_id: PlayerId,
        voter_name: String,
    },
    GameOver(GameResult),
    PlayerDisconnected {
        player_id: PlayerId,
        player_name: String,
    },
    BecameHost {},
    ReceiveMessage {
        sender: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::ErrorMessage {
            message: message.into(),
        }
    }
}
