//! # Spyfall
//!
//! A server-authoritative room server for the Spyfall party game.
//!
//! Players connect over WebSocket, get a durable identity from the
//! handshake, and create or join five-digit rooms. Each room runs as its own
//! actor with its own countdown; this crate wires the layers together:
//!
//! ```text
//! transport → protocol → session → room registry → room actors
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spyfall::prelude::*;
//!
//! # async fn run() -> Result<(), SpyfallError> {
//! let server = SpyfallServer::builder()
//!     .bind("0.0.0.0:4000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::SpyfallError;
pub use server::{SpyfallServer, SpyfallServerBuilder};

/// Everything a server binary or an integration test usually needs.
pub mod prelude {
    pub use crate::{ServerConfig, SpyfallError, SpyfallServer, SpyfallServerBuilder};
    pub use spyfall_protocol::{
        ClientCommand, Codec, Envelope, GameResult, JsonCodec, Outcome, PROTOCOL_VERSION, Payload,
        PlayerId, PlayerView, Role, RoomCode, ServerEvent, Settings, SettingsPatch, SystemMessage,
    };
    pub use spyfall_room::{RoomConfig, RoomError, RoomRegistry};
    pub use spyfall_session::{SessionConfig, SessionError};
}
