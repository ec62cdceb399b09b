//! Room code generation.
//!
//! A [`CodeSource`] only proposes codes; the registry checks each proposal
//! against the live rooms and draws again on a collision.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spyfall_protocol::RoomCode;

/// Proposes candidate room codes.
///
/// `Send` because the registry lives inside shared server state.
pub trait CodeSource: Send {
    fn next_code(&mut self) -> RoomCode;
}

/// Uniformly random 5-digit codes, `00000` through `99999`.
pub struct RandomCodes {
    rng: StdRng,
}

impl RandomCodes {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeSource for RandomCodes {
    fn next_code(&mut self) -> RoomCode {
        RoomCode::from_number(self.rng.random_range(0..RoomCode::SPACE))
    }
}
