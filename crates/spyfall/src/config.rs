//! Server configuration, loadable from a TOML file.
//!
//! ```toml
//! bind = "0.0.0.0:4000"
//! idle_timeout_secs = 60
//!
//! [room]
//! min_players = 3
//! voting_echo_ms = [500, 1500]
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use spyfall_room::RoomConfig;
use spyfall_session::SessionConfig;

use crate::SpyfallError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,

    /// A connection must complete its handshake within this window.
    pub handshake_timeout_secs: u64,

    /// A connection that sends nothing for this long is closed.
    pub idle_timeout_secs: u64,

    /// How long a dropped player can resume their identity.
    pub reconnect_grace_secs: u64,

    /// How often expired sessions are swept.
    pub session_sweep_secs: u64,

    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:4000".to_string(),
            handshake_timeout_secs: 5,
            idle_timeout_secs: 30,
            reconnect_grace_secs: 120,
            session_sweep_secs: 30,
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpyfallError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SpyfallError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SpyfallError> {
        Ok(toml::from_str(text)?)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Never zero, so the sweeper's interval is valid.
    pub fn session_sweep(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs.max(1))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect_grace: Duration::from_secs(self.reconnect_grace_secs),
        }
    }
}
