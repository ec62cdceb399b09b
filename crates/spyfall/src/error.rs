//! Unified error type for the Spyfall server.

use std::path::PathBuf;

use spyfall_protocol::ProtocolError;
use spyfall_room::RoomError;
use spyfall_session::SessionError;
use spyfall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SpyfallError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unknown or expired session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, full, wrong phase).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
