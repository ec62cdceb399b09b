//! Player sessions for the Spyfall server.
//!
//! A session separates a player's durable identity from the connection that
//! currently carries it:
//!
//! 1. **Identity** — the server issues a [`PlayerId`](spyfall_protocol::PlayerId)
//!    and a secret resume token on the first handshake.
//! 2. **Binding** — the session records which
//!    [`ConnectionId`](spyfall_transport::ConnectionId) is current, so a close
//!    from a superseded socket is ignored.
//! 3. **Resumption** — a handshake carrying the token re-binds the same
//!    identity to a new connection within a grace period.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)  ← opens/resumes sessions during the handshake
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol + Transport (below)  ← PlayerId, ConnectionId
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
