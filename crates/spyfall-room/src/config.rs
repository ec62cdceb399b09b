//! Room configuration and phase state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Server-wide limits and timings applied to every room.
///
/// Host-editable values live in [`Settings`](spyfall_protocol::Settings);
/// this is the operator's side. Loaded from the `[room]` table of the server
/// config, every field optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Connected players required to start a round.
    pub min_players: usize,

    /// Upper bound a host may set `maxPlayers` to.
    pub max_players_cap: usize,

    /// Upper bound a host may set `gameTimeMinutes` to.
    pub max_game_minutes: u32,

    /// Display names longer than this (in characters) are rejected.
    pub max_name_len: usize,

    /// Chat messages longer than this (in characters) are truncated.
    pub max_message_len: usize,

    /// Countdown tick period in milliseconds.
    pub tick_period_ms: u64,

    /// Delays after the first `startVoting` at which it is sent again.
    pub voting_echo_ms: Vec<u64>,

    /// Room actor command channel capacity.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: 4,
            max_players_cap: 16,
            max_game_minutes: 60,
            max_name_len: 24,
            max_message_len: 500,
            tick_period_ms: 1000,
            voting_echo_ms: vec![500, 1500],
            channel_size: 64,
        }
    }
}

impl RoomConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn voting_echo_delays(&self) -> Vec<Duration> {
        self.voting_echo_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The macro-state of a room.
///
/// ```text
/// Waiting ──startGame──→ Playing ──countdown zero──→ Voting ──quorum──→ Ended
///    ↑                      ↑                                             │
///    │                      └─────────────────startGame───────────────────┤
///    └──────────────────────────────────resetRoom─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Waiting,
    Playing,
    Voting,
    Ended,
}

impl Phase {
    /// Returns `true` while a round is running (roles are assigned and
    /// departures only flag players as disconnected).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Voting)
    }

    /// Chat is open only during a round.
    pub fn allows_chat(&self) -> bool {
        self.is_active()
    }

    /// Returns `true` if `startGame` may be issued from this phase.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Waiting | Self::Ended)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Playing)
                | (Self::Playing, Self::Voting)
                | (Self::Voting, Self::Ended)
                | (Self::Ended, Self::Playing)
                | (Self::Ended, Self::Waiting)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Playing => write!(f, "Playing"),
            Self::Voting => write!(f, "Voting"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}
