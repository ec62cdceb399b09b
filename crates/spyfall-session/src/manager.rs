//! The session manager: every identity the server has issued.
//!
//! `SessionManager` is a plain struct, not a concurrent map. The gateway
//! keeps it behind a mutex in its shared state; nothing here awaits.

use std::collections::HashMap;

use rand::Rng;
use spyfall_protocol::PlayerId;
use spyfall_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Issues and tracks player sessions.
///
/// ```text
/// open() ──→ [Connected] ──disconnect()──→ [Disconnected] ──expire_stale()──→ [Expired]
///                ↑                               │                                │
///                └───────────resume()────────────┘                       cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
    /// Resume token → owner. Kept in sync with `sessions`.
    tokens: HashMap<String, PlayerId>,
    next_player: u64,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            next_player: 1,
            config,
        }
    }

    /// Issues a fresh identity bound to `connection`.
    pub fn open(&mut self, connection: ConnectionId) -> &Session {
        let player_id = PlayerId(self.next_player);
        self.next_player += 1;

        let token = generate_token();
        self.tokens.insert(token.clone(), player_id);

        tracing::info!(%player_id, %connection, "session opened");

        self.sessions.entry(player_id).or_insert(Session {
            player_id,
            state: SessionState::Connected,
            resume_token: token,
            connection,
        })
    }

    /// Re-binds the identity behind `token` to `connection`.
    ///
    /// Succeeds for a Disconnected session still inside its grace period and
    /// for a Connected session on another connection (the old one is simply
    /// superseded).
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: token unknown or already swept
    /// - [`SessionError::SessionExpired`]: grace period elapsed
    pub fn resume(
        &mut self,
        token: &str,
        connection: ConnectionId,
    ) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;
        let grace = self.config.reconnect_grace;

        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match session.state {
            SessionState::Expired => return Err(SessionError::SessionExpired(player_id)),
            SessionState::Disconnected { since } if since.elapsed() >= grace => {
                session.state = SessionState::Expired;
                return Err(SessionError::SessionExpired(player_id));
            }
            SessionState::Disconnected { .. } => {
                tracing::info!(%player_id, %connection, "session resumed");
            }
            SessionState::Connected => {
                tracing::info!(
                    %player_id,
                    previous = %session.connection,
                    %connection,
                    "session taken over by new connection"
                );
            }
        }

        session.state = SessionState::Connected;
        session.connection = connection;
        Ok(session)
    }

    /// Resumes `token` when possible, otherwise opens a fresh identity.
    /// The flag is `true` when an existing identity was resumed.
    pub fn handshake(
        &mut self,
        token: Option<&str>,
        connection: ConnectionId,
    ) -> (Session, bool) {
        if let Some(token) = token {
            match self.resume(token, connection) {
                Ok(session) => return (session.clone(), true),
                Err(e) => {
                    tracing::debug!(%connection, error = %e, "resume rejected, issuing new identity");
                }
            }
        }
        (self.open(connection).clone(), false)
    }

    /// Marks the player disconnected if `connection` is still the one bound
    /// to their session. Returns whether the session changed state; a close
    /// from a superseded connection returns `Ok(false)`.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session exists.
    pub fn disconnect(
        &mut self,
        player_id: PlayerId,
        connection: ConnectionId,
    ) -> Result<bool, SessionError> {
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;

        if session.connection != connection {
            tracing::debug!(
                %player_id,
                %connection,
                current = %session.connection,
                "ignoring close from superseded connection"
            );
            return Ok(false);
        }
        if session.state != SessionState::Connected {
            return Ok(false);
        }

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };
        tracing::info!(%player_id, "player disconnected, grace period started");
        Ok(true)
    }

    /// Expires every Disconnected session whose grace period has elapsed and
    /// returns their ids.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() >= grace {
                    session.state = SessionState::Expired;
                    expired.push(session.player_id);
                    tracing::info!(player_id = %session.player_id, "session expired");
                }
            }
        }

        expired
    }

    /// Drops expired sessions and forgets their tokens.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            if session.state == SessionState::Expired {
                self.tokens.remove(&session.resume_token);
                false
            } else {
                true
            }
        });
        before - self.sessions.len()
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_connected()).count()
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
