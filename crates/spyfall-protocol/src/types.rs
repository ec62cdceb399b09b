//! Envelope and identity types for the Spyfall wire format.
//!
//! Everything in this module travels on the wire. Game-level commands and
//! events live in [`crate::messages`]; this module holds the framing around
//! them and the identifiers both sides agree on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClientCommand, ServerEvent};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Durable identifier for a player.
///
/// Issued by the session layer on the first handshake and kept across
/// reconnects, so a page refresh is recognized as "same player, new
/// connection". Serialized as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// The externally-addressable code of a room: a fixed-width numeric string.
///
/// Deserialization accepts any string so that a malformed code from a client
/// reaches the room layer and is rejected there with a readable error.
/// Use [`RoomCode::is_valid`] (or [`RoomCode::parse`]) before trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of digits in every room code.
    pub const LEN: usize = 5;

    /// Number of distinct codes (`10^LEN`).
    pub const SPACE: u32 = 100_000;

    /// Parses a user-entered code. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = Self(raw.trim().to_string());
        code.is_valid().then_some(code)
    }

    /// Builds a code from a number, zero-padded to [`Self::LEN`] digits.
    ///
    /// Numbers outside the code space wrap around.
    pub fn from_number(n: u32) -> Self {
        Self(format!("{:0width$}", n % Self::SPACE, width = Self::LEN))
    }

    /// `true` if the code is exactly [`Self::LEN`] ASCII digits.
    pub fn is_valid(&self) -> bool {
        self.0.len() == Self::LEN && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who inside a room should receive a server event.
///
/// The room state machine pairs every outbound [`ServerEvent`] with a
/// `Recipient`; the room actor resolves it against its roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connected member of the room.
    All,
    /// One specific player.
    Player(PlayerId),
}

// ---------------------------------------------------------------------------
// SystemMessage
// ---------------------------------------------------------------------------

/// Connection-level messages, handled by the gateway rather than a room.
///
/// Internally tagged: `{ "type": "Handshake", "version": 1, "resumeToken": null }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SystemMessage {
    /// Client → Server, first frame on every connection.
    /// `resume_token` is the token from a previous `HandshakeAck`, if any.
    Handshake {
        version: u32,
        resume_token: Option<String>,
    },

    /// Server → Client: the durable identity bound to this connection and the
    /// token that re-binds it after a reconnect.
    HandshakeAck {
        player_id: PlayerId,
        resume_token: String,
        server_time: u64,
    },

    /// Either direction: "I'm closing this connection."
    Disconnect { reason: String },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client keep-alive reply, echoing the client's timestamp.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Server → Client protocol failure (bad handshake, wrong version).
    /// Game-level rejections use `ServerEvent::ErrorMessage` instead.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// What an envelope carries.
///
/// Adjacently tagged:
/// `{ "type": "Command", "data": { "event": "startGame", "data": { "roomCode": "12345" } } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    /// Client → Server game command.
    Command(ClientCommand),
    /// Server → Client game event.
    Event(ServerEvent),
}

/// Every frame on the wire is an `Envelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction, per-connection sequence number.
    pub seq: u64,

    /// Milliseconds since the sender started.
    pub timestamp: u64,

    pub payload: Payload,
}

impl Envelope {
    pub fn new(seq: u64, timestamp: u64, payload: Payload) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}
