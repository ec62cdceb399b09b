//! Session types: the server's record of one player's identity.

use std::time::Duration;

use spyfall_protocol::PlayerId;
use spyfall_transport::ConnectionId;
use tokio::time::Instant;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a disconnected player has to resume before the session is
    /// expired. A zero grace period expires sessions on the next sweep.
    pub reconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(120),
        }
    }
}

/// Lifecycle of a session.
///
/// ```text
///   Connected ──(close)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                       │
///       └──────(resume)─────────┘
/// ```
///
/// A Connected session can also be resumed directly (the client opened a new
/// socket before the old one was noticed closing); that just moves the
/// binding to the new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// Disconnected at `since`; resumable until `since + grace`.
    Disconnected { since: Instant },
    Expired,
}

/// A single player's session.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    pub state: SessionState,

    /// Secret the client presents in its next handshake to keep its
    /// identity. 32 lowercase hex characters (128 bits).
    pub resume_token: String,

    /// The connection currently bound to this identity.
    pub connection: ConnectionId,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}
