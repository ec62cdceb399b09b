//! Wire protocol for the Spyfall server.
//!
//! - **Types** ([`Envelope`], [`Payload`], [`SystemMessage`], ids) — the
//!   framing every frame shares.
//! - **Messages** ([`ClientCommand`], [`ServerEvent`], [`Settings`]) — the
//!   game vocabulary.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how frames become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room (commands / events)
//! ```

mod codec;
mod error;
mod messages;
mod types;

/// Version clients must announce in their handshake.
pub const PROTOCOL_VERSION: u32 = 1;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientCommand, GameResult, Outcome, PlayerView, Role, ServerEvent, Settings, SettingsPatch,
    VoteReveal,
};
pub use types::{Envelope, Payload, PlayerId, Recipient, RoomCode, SystemMessage};
