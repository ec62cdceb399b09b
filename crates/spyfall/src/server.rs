//! `SpyfallServer` builder and server loop.
//!
//! This is the entry point for running a Spyfall server. It ties together
//! all the layers: transport → protocol → session → room registry.

use std::sync::Arc;
use std::time::Instant;

use spyfall_protocol::{Codec, JsonCodec};
use spyfall_room::{RoomConfig, RoomRegistry};
use spyfall_session::SessionManager;
use spyfall_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::handler::handle_connection;
use crate::{ServerConfig, SpyfallError};

/// Shared server state passed to each connection handler task.
///
/// Lock order is `sessions` before `rooms`; nothing takes them the other way
/// round.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    started: Instant,
}

impl<C: Codec> ServerState<C> {
    /// Milliseconds since the server started, for envelope timestamps.
    pub(crate) fn clock_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for configuring and starting a Spyfall server.
///
/// # Example
///
/// ```rust,ignore
/// use spyfall::prelude::*;
///
/// let server = SpyfallServer::builder()
///     .config(ServerConfig::load("spyfall.toml")?)
///     .bind("127.0.0.1:0")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct SpyfallServerBuilder {
    config: ServerConfig,
    registry: Option<RoomRegistry>,
}

impl SpyfallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the limits and timings applied to every room.
    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    /// Uses a prepared registry, e.g. one with seeded code and role sources.
    /// Its own room config wins over [`room_config`](Self::room_config).
    pub fn registry(mut self, registry: RoomRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<SpyfallServer<JsonCodec>, SpyfallError> {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;

        let registry = self
            .registry
            .unwrap_or_else(|| RoomRegistry::new(self.config.room.clone()));

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.config.session_config())),
            rooms: Mutex::new(registry),
            codec: JsonCodec,
            config: self.config,
            started: Instant::now(),
        });

        Ok(SpyfallServer { transport, state })
    }
}

impl Default for SpyfallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Spyfall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SpyfallServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl SpyfallServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> SpyfallServerBuilder {
        SpyfallServerBuilder::new()
    }
}

impl<C: Codec> SpyfallServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns the session sweeper, then accepts connections and spawns a
    /// handler task for each. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), SpyfallError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Spyfall server running");

        tokio::spawn(sweep_sessions(Arc::clone(&self.state)));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Expires sessions whose grace period ran out and drops their room
/// mappings so the tokens can no longer re-bind.
async fn sweep_sessions<C: Codec>(state: Arc<ServerState<C>>) {
    let mut interval = tokio::time::interval(state.config.session_sweep());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut sessions = state.sessions.lock().await;
        let expired = sessions.expire_stale();
        let removed = sessions.cleanup_expired();
        if expired.is_empty() && removed == 0 {
            continue;
        }

        let mut rooms = state.rooms.lock().await;
        for player in &expired {
            rooms.forget_player(*player);
        }
        tracing::debug!(
            expired = expired.len(),
            removed,
            remaining = sessions.len(),
            "swept expired sessions"
        );
    }
}
