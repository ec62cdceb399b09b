//! Room lifecycle for the Spyfall server.
//!
//! Each room runs as an isolated Tokio task (actor) that owns a pure
//! [`Room`] state machine together with its countdown and per-player
//! outbound channels. Commands and timer ticks are processed one at a time
//! in the same loop, so a room never sees two mutations interleave.
//!
//! # Key types
//!
//! - [`Room`] — the synchronous state machine; every operation returns
//!   [`Effects`] (events addressed by `Recipient` plus a timer directive)
//! - [`RoomRegistry`] — creates/destroys rooms and routes players to them
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`tally`] — turns recorded votes into a [`GameResult`](spyfall_protocol::GameResult)
//! - [`CodeSource`] — where room codes come from

mod actor;
mod catalog;
mod code;
mod config;
mod error;
mod registry;
mod room;
mod roster;
mod tally;

pub use actor::{Departure, GameSnapshot, PlayerSender, RoomHandle, RoomRequest, RoomSnapshot};
pub use catalog::{LOCATIONS, UNKNOWN_LOCATION, all_locations};
pub use code::{CodeSource, RandomCodes};
pub use config::{Phase, RoomConfig};
pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::{Assignment, Effects, GameState, Room, TimerAction};
pub use roster::{Player, Roster};
pub use tally::{Vote, tally};
