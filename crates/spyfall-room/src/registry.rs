//! Room registry: creates, tracks, and routes players to rooms.

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use spyfall_protocol::{PlayerId, RoomCode, Settings};

use crate::actor::spawn_room;
use crate::{
    CodeSource, PlayerSender, RandomCodes, Room, RoomConfig, RoomError, RoomHandle, RoomRequest,
    RoomSnapshot,
};

/// Draws before giving up on finding a free code.
const MAX_CODE_ATTEMPTS: usize = 1_000;

/// Owns every live room and knows which room each player is in.
///
/// The only component that creates or destroys rooms. Not thread-safe by
/// itself; the server keeps it behind a mutex.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, RoomHandle>,

    /// A player is in at most one room at a time.
    player_rooms: HashMap<PlayerId, RoomCode>,

    codes: Box<dyn CodeSource>,

    /// Seeds each room's own RNG for role assignment.
    rng: StdRng,

    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self::with_sources(config, RandomCodes::new(), StdRng::from_os_rng())
    }

    /// Uses the given code source and seed RNG, for reproducible runs.
    pub fn with_sources(config: RoomConfig, codes: impl CodeSource + 'static, rng: StdRng) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            codes: Box::new(codes),
            rng,
            config,
        }
    }

    /// Creates a room with `player` as host and returns its code.
    ///
    /// A player already in another room leaves it first.
    pub async fn create_room(
        &mut self,
        player: PlayerId,
        player_name: &str,
        sender: PlayerSender,
    ) -> Result<(RoomCode, Settings), RoomError> {
        Room::validate_name(player_name, &self.config)?;
        let code = self.allocate_code()?;

        if let Some(previous) = self.player_rooms.get(&player).cloned() {
            self.depart_quietly(&previous, player).await;
        }

        let (room, created) = Room::create(code.clone(), self.config.clone(), player, player_name)?;
        let settings = *room.settings();
        let rng = StdRng::from_rng(&mut self.rng);
        let handle = spawn_room(room, created, player, sender, rng);

        self.rooms.insert(code.clone(), handle);
        self.player_rooms.insert(player, code.clone());
        tracing::debug!(room_code = %code, rooms = self.rooms.len(), "room registered");
        Ok((code, settings))
    }

    fn allocate_code(&mut self) -> Result<RoomCode, RoomError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.codes.next_code();
            if !code.is_valid() {
                continue;
            }
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
            tracing::debug!(room_code = %code, "room code collision, drawing again");
        }
        tracing::warn!(rooms = self.rooms.len(), "no free room code found");
        Err(RoomError::NoFreeCodes)
    }

    /// Adds `player` to the room, or reconnects them if they are already on
    /// its roster. A player in a different room leaves it once the join
    /// succeeds.
    pub async fn join_room(
        &mut self,
        code: &RoomCode,
        player: PlayerId,
        player_name: &str,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        let code = &normalize(code)?;
        let handle = self.handle(code)?;
        handle.join(player, player_name.to_string(), sender).await?;

        if let Some(previous) = self.player_rooms.insert(player, code.clone()) {
            if previous != *code {
                self.depart_quietly(&previous, player).await;
            }
        }
        Ok(())
    }

    /// Re-binds a resumed player to the room they were in, replaying its
    /// state to them. Returns the room code if there was one.
    pub async fn reattach(&mut self, player: PlayerId, sender: PlayerSender) -> Option<RoomCode> {
        let code = self.player_rooms.get(&player)?.clone();
        let Some(handle) = self.rooms.get(&code) else {
            self.player_rooms.remove(&player);
            return None;
        };

        match handle.reattach(player, sender).await {
            Ok(()) => Some(code),
            Err(e) => {
                tracing::debug!(room_code = %code, %player, error = %e, "reattach failed");
                self.player_rooms.remove(&player);
                None
            }
        }
    }

    /// Handles an explicit `leaveRoom`.
    pub async fn leave_room(&mut self, code: &RoomCode, player: PlayerId) -> Result<(), RoomError> {
        let code = &normalize(code)?;
        let handle = self.handle(code)?;
        let departure = handle.leave(player).await?;

        if self.player_rooms.get(&player) == Some(code) {
            self.player_rooms.remove(&player);
        }
        if departure.abandoned {
            self.delete_room(code).await?;
        }
        Ok(())
    }

    /// Handles a dropped connection. Mid-round the player stays mapped to
    /// the room so a resumed session can [`reattach`](Self::reattach).
    pub async fn disconnect(&mut self, player: PlayerId) {
        let Some(code) = self.player_rooms.get(&player).cloned() else {
            return;
        };
        let Some(handle) = self.rooms.get(&code) else {
            self.player_rooms.remove(&player);
            return;
        };

        match handle.leave(player).await {
            Ok(departure) => {
                if departure.removed {
                    self.player_rooms.remove(&player);
                }
                if departure.abandoned {
                    let _ = self.delete_room(&code).await;
                }
            }
            Err(e) => {
                tracing::debug!(room_code = %code, %player, error = %e, "disconnect departure failed");
                self.player_rooms.remove(&player);
            }
        }
    }

    /// Forwards a room-scoped request to the room's actor.
    pub async fn route(
        &self,
        code: &RoomCode,
        player: PlayerId,
        request: RoomRequest,
    ) -> Result<(), RoomError> {
        self.handle(code)?.request(player, request).await
    }

    /// Shuts a room down (its actor cancels its timers first) and forgets
    /// everyone mapped to it.
    pub async fn delete_room(&mut self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .remove(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;

        let _ = handle.shutdown().await;
        self.player_rooms.retain(|_, c| c != code);

        tracing::info!(room_code = %code, rooms = self.rooms.len(), "room deleted");
        Ok(())
    }

    /// Drops the player → room mapping, e.g. when their session expires.
    pub fn forget_player(&mut self, player: PlayerId) {
        self.player_rooms.remove(&player);
    }

    pub async fn snapshot(&self, code: &RoomCode) -> Result<RoomSnapshot, RoomError> {
        self.handle(code)?.snapshot().await
    }

    /// A clone of the room's handle, for callers that must not hold the
    /// registry while they talk to the room.
    pub fn room(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.get(code).cloned()
    }

    /// Like [`room`](Self::room), but with the error a client should see
    /// for a malformed or unknown code.
    pub fn lookup(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.handle(code).cloned()
    }

    pub fn room_of(&self, player: PlayerId) -> Option<&RoomCode> {
        self.player_rooms.get(&player)
    }

    pub fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn handle(&self, code: &RoomCode) -> Result<&RoomHandle, RoomError> {
        let code = normalize(code)?;
        self.rooms.get(&code).ok_or(RoomError::RoomNotFound(code))
    }

    /// Leaves `code` on the player's behalf, ignoring failures.
    async fn depart_quietly(&mut self, code: &RoomCode, player: PlayerId) {
        let Some(handle) = self.rooms.get(code) else {
            return;
        };
        match handle.leave(player).await {
            Ok(departure) if departure.abandoned => {
                let _ = self.delete_room(code).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(room_code = %code, %player, error = %e, "leaving previous room failed");
            }
        }
    }
}

/// Codes typed by a player may carry surrounding whitespace.
fn normalize(code: &RoomCode) -> Result<RoomCode, RoomError> {
    RoomCode::parse(code.as_str())
        .ok_or_else(|| RoomError::InvalidInput("room code must be 5 digits".into()))
}
