//! The room state machine.
//!
//! [`Room`] is synchronous and owns no channels or timers. Every operation
//! validates, mutates, and returns [`Effects`]: the events to deliver,
//! addressed by [`Recipient`], and an optional directive for the room's
//! countdown. The actor in [`crate::actor`] carries those out. Keeping the
//! two apart lets every rule below be tested without a runtime.

use std::time::{Duration, SystemTime};

use rand::Rng;
use spyfall_protocol::{
    GameResult, PlayerId, Recipient, Role, RoomCode, ServerEvent, Settings, SettingsPatch,
};

use crate::{
    LOCATIONS, Phase, RoomConfig, RoomError, Roster, UNKNOWN_LOCATION, Vote, all_locations, tally,
};

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// What the actor should do with the room's countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// (Re)start the countdown from `seconds`.
    Start { seconds: u32 },
    /// Stop the countdown and arm the `startVoting` re-delivery schedule.
    BeginVoting,
    /// Stop the countdown and any pending re-delivery.
    Cancel,
}

/// Output of one room operation.
#[derive(Debug, Default)]
pub struct Effects {
    /// In commit order.
    pub events: Vec<(Recipient, ServerEvent)>,
    pub timer: Option<TimerAction>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.timer.is_none()
    }

    /// Events `player` would receive, assuming they are connected.
    pub fn events_for(&self, player: PlayerId) -> Vec<&ServerEvent> {
        self.events
            .iter()
            .filter(|(to, _)| match to {
                Recipient::All => true,
                Recipient::Player(p) => *p == player,
            })
            .map(|(_, event)| event)
            .collect()
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.events.push((Recipient::All, event));
    }

    fn unicast(&mut self, player: PlayerId, event: ServerEvent) {
        self.events.push((Recipient::Player(player), event));
    }
}

// ---------------------------------------------------------------------------
// Assignment / GameState
// ---------------------------------------------------------------------------

/// The secret part of a round: where it takes place and who the spies are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub location: String,
    pub spies: Vec<PlayerId>,
}

impl Assignment {
    /// Picks a location uniformly from the catalog and `spies_count` distinct
    /// spies from `eligible`.
    ///
    /// Spies are chosen by rejection sampling over indices: draw uniformly,
    /// discard repeats. Every eligible player is equally likely to be picked.
    /// At least one eligible player is always left a civilian.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, eligible: &[PlayerId], spies_count: usize) -> Self {
        let location = LOCATIONS[rng.random_range(0..LOCATIONS.len())].to_string();

        let wanted = spies_count.min(eligible.len().saturating_sub(1));
        let mut picked: Vec<usize> = Vec::with_capacity(wanted);
        while picked.len() < wanted {
            let index = rng.random_range(0..eligible.len());
            if !picked.contains(&index) {
                picked.push(index);
            }
        }

        Self {
            location,
            spies: picked.into_iter().map(|i| eligible[i]).collect(),
        }
    }
}

/// State of the current (or just finished) round.
#[derive(Debug, Clone)]
pub struct GameState {
    pub location: String,
    pub spies: Vec<PlayerId>,
    pub started_at: SystemTime,
    pub ends_at: SystemTime,
    /// As of the last countdown tick.
    pub remaining_secs: u32,
    /// One entry per voter, in first-cast order.
    pub votes: Vec<Vote>,
}

impl GameState {
    pub fn is_spy(&self, player: PlayerId) -> bool {
        self.spies.contains(&player)
    }

    fn started_event_for(&self, player: PlayerId) -> ServerEvent {
        let spy = self.is_spy(player);
        ServerEvent::GameStarted {
            role: if spy { Role::Spy } else { Role::Civilian },
            location: if spy {
                UNKNOWN_LOCATION.to_string()
            } else {
                self.location.clone()
            },
            all_locations: all_locations(),
            timer: self.remaining_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One room: roster, settings, phase and the current round.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    config: RoomConfig,
    settings: Settings,
    phase: Phase,
    roster: Roster,
    game: Option<GameState>,
    /// Replayed to players who reconnect into an Ended room.
    last_result: Option<GameResult>,
    /// Last `canStartGame` value announced to the room.
    can_start: bool,
}

impl Room {
    /// Trims a display name and checks it is non-empty and short enough.
    pub fn validate_name(raw: &str, config: &RoomConfig) -> Result<String, RoomError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidInput("player name is required".into()));
        }
        if name.chars().count() > config.max_name_len {
            return Err(RoomError::InvalidInput(format!(
                "player name must be at most {} characters",
                config.max_name_len
            )));
        }
        Ok(name.to_string())
    }

    /// Creates a room in Waiting with `host` as its only player.
    pub fn create(
        code: RoomCode,
        config: RoomConfig,
        host: PlayerId,
        player_name: &str,
    ) -> Result<(Self, Effects), RoomError> {
        let name = Self::validate_name(player_name, &config)?;

        let mut room = Self {
            code,
            config,
            settings: Settings::default(),
            phase: Phase::Waiting,
            roster: Roster::new(),
            game: None,
            last_result: None,
            can_start: false,
        };
        room.roster.add(host, &name);

        let mut fx = Effects::default();
        fx.unicast(
            host,
            ServerEvent::RoomCreated {
                room_code: room.code.clone(),
                is_host: true,
                settings: room.settings,
            },
        );
        room.push_roster(&mut fx);
        room.push_can_start_change(&mut fx);

        tracing::info!(room_code = %room.code, %host, "room created");
        Ok((room, fx))
    }

    // -- accessors ---------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn last_result(&self) -> Option<&GameResult> {
        self.last_result.as_ref()
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// No roster left, or nobody in it is connected.
    pub fn is_abandoned(&self) -> bool {
        self.roster.connected_count() == 0
    }

    // -- roster operations -------------------------------------------------

    /// Adds `player`, or treats the call as a reconnection if they are
    /// already on the roster.
    /// The name is ignored on reconnection.
    pub fn join(&mut self, player: PlayerId, player_name: &str) -> Result<Effects, RoomError> {
        if self.roster.contains(player) {
            return self.reconnect(player);
        }
        let name = Self::validate_name(player_name, &self.config)?;
        if self.phase != Phase::Waiting {
            return Err(RoomError::GameInProgress(self.code.clone()));
        }
        if self.roster.len() >= self.settings.max_players {
            return Err(RoomError::RoomFull(self.code.clone()));
        }

        let joined = self.roster.add(player, &name).clone();

        let mut fx = Effects::default();
        fx.unicast(
            player,
            ServerEvent::RoomJoined {
                room_code: self.code.clone(),
                player_name: joined.name,
                is_host: joined.is_host,
                settings: self.settings,
            },
        );
        self.push_roster(&mut fx);
        self.push_can_start_change(&mut fx);

        tracing::info!(
            room_code = %self.code,
            %player,
            players = self.roster.len(),
            "player joined"
        );
        Ok(fx)
    }

    /// Marks an existing member connected again and brings them up to date:
    /// their role and the clock mid-round, or the result after it.
    pub fn reconnect(&mut self, player: PlayerId) -> Result<Effects, RoomError> {
        if !self.roster.set_connected(player, true) {
            return Err(RoomError::NotInRoom(player, self.code.clone()));
        }

        let mut fx = Effects::default();
        if let Some(host) = self.roster.ensure_host() {
            fx.unicast(host, ServerEvent::BecameHost {});
        }

        let (name, is_host) = self
            .roster
            .get(player)
            .map(|p| (p.name.clone(), p.is_host))
            .unwrap_or_default();
        fx.unicast(
            player,
            ServerEvent::RoomJoined {
                room_code: self.code.clone(),
                player_name: name,
                is_host,
                settings: self.settings,
            },
        );
        self.push_roster(&mut fx);
        self.push_can_start_change(&mut fx);
        self.push_replay(player, &mut fx);

        tracing::info!(room_code = %self.code, %player, phase = %self.phase, "player reconnected");
        Ok(fx)
    }

    /// Departure by `leaveRoom` or a dropped connection.
    ///
    /// In Waiting the player is removed; otherwise they stay on the roster
    /// flagged disconnected so their role and vote survive. A departing host
    /// hands over to the first connected player in join order.
    pub fn leave(&mut self, player: PlayerId) -> Result<Effects, RoomError> {
        let Some(departing) = self.roster.get(player) else {
            return Err(RoomError::NotInRoom(player, self.code.clone()));
        };
        let name = departing.name.clone();
        let was_host = departing.is_host;
        let was_connected = departing.is_connected;

        let mut fx = Effects::default();
        if self.phase == Phase::Waiting {
            self.roster.remove(player);
            tracing::info!(
                room_code = %self.code,
                %player,
                players = self.roster.len(),
                "player left"
            );
        } else {
            if !was_connected {
                return Ok(fx);
            }
            self.roster.set_connected(player, false);
            fx.broadcast(ServerEvent::PlayerDisconnected {
                player_id: player,
                player_name: name,
            });
            tracing::info!(room_code = %self.code, %player, phase = %self.phase, "player disconnected");
        }

        if was_host {
            if let Some(successor) = self.roster.ensure_host() {
                fx.unicast(successor, ServerEvent::BecameHost {});
                tracing::info!(room_code = %self.code, host = %successor, "host migrated");
            }
        }

        self.push_roster(&mut fx);
        self.push_can_start_change(&mut fx);
        self.check_quorum(&mut fx);
        Ok(fx)
    }

    // -- host actions ------------------------------------------------------

    /// Merges `patch` into the settings after validating the result.
    pub fn update_settings(
        &mut self,
        caller: PlayerId,
        patch: &SettingsPatch,
    ) -> Result<Effects, RoomError> {
        if !self.roster.is_host(caller) {
            return Err(RoomError::Unauthorized("change the settings"));
        }
        if self.phase.is_active() {
            return Err(RoomError::GameInProgress(self.code.clone()));
        }

        let merged = self.settings.merged(patch);
        self.validate_settings(&merged)?;
        self.settings = merged;

        let mut fx = Effects::default();
        fx.broadcast(ServerEvent::SettingsUpdated {
            settings: self.settings,
        });
        tracing::debug!(room_code = %self.code, settings = ?self.settings, "settings updated");
        Ok(fx)
    }

    fn validate_settings(&self, settings: &Settings) -> Result<(), RoomError> {
        let config = &self.config;
        if settings.max_players < config.min_players || settings.max_players > config.max_players_cap
        {
            return Err(RoomError::InvalidInput(format!(
                "max players must be between {} and {}",
                config.min_players, config.max_players_cap
            )));
        }
        if settings.max_players < self.roster.len() {
            return Err(RoomError::InvalidInput(format!(
                "max players cannot be lower than the {} players already in the room",
                self.roster.len()
            )));
        }
        if settings.game_time_minutes == 0 || settings.game_time_minutes > config.max_game_minutes {
            return Err(RoomError::InvalidInput(format!(
                "game time must be between 1 and {} minutes",
                config.max_game_minutes
            )));
        }
        if settings.spies_count == 0 || settings.spies_count >= settings.max_players {
            return Err(RoomError::InvalidInput(
                "spies count must be at least 1 and below max players".into(),
            ));
        }
        Ok(())
    }

    /// Returns the players a new round would be dealt to.
    fn check_start(&self, caller: PlayerId) -> Result<Vec<PlayerId>, RoomError> {
        if !self.roster.is_host(caller) {
            return Err(RoomError::Unauthorized("start the game"));
        }
        if !self.phase.can_start() {
            return Err(RoomError::GameInProgress(self.code.clone()));
        }
        let eligible = self.roster.connected_ids();
        if eligible.len() < self.config.min_players {
            return Err(RoomError::NotEnoughPlayers {
                needed: self.config.min_players,
                connected: eligible.len(),
            });
        }
        if self.settings.spies_count >= eligible.len() {
            return Err(RoomError::InvalidInput(format!(
                "{} spies need more than {} players",
                self.settings.spies_count,
                eligible.len()
            )));
        }
        Ok(eligible)
    }

    /// Starts a round with a freshly drawn [`Assignment`].
    pub fn start_game<R: Rng + ?Sized>(
        &mut self,
        caller: PlayerId,
        rng: &mut R,
        now: SystemTime,
    ) -> Result<Effects, RoomError> {
        let eligible = self.check_start(caller)?;
        let assignment = Assignment::draw(rng, &eligible, self.settings.spies_count);
        self.start_game_with(caller, assignment, now)
    }

    /// Starts a round with a given assignment. The spies must be
    /// `spiesCount` distinct connected players.
    ///
    /// The roster is kept as is. Members still flagged disconnected from the
    /// previous round are not dealt in now; they get a civilian card if they
    /// reconnect mid-round.
    pub fn start_game_with(
        &mut self,
        caller: PlayerId,
        assignment: Assignment,
        now: SystemTime,
    ) -> Result<Effects, RoomError> {
        let eligible = self.check_start(caller)?;

        let mut spies = assignment.spies.clone();
        spies.sort_unstable();
        spies.dedup();
        if spies.len() != self.settings.spies_count
            || spies.len() != assignment.spies.len()
            || !spies.iter().all(|s| eligible.contains(s))
        {
            return Err(RoomError::InvalidInput("invalid role assignment".into()));
        }

        self.set_phase(Phase::Playing)?;

        let mut fx = Effects::default();
        let seconds = self.settings.round_seconds();
        let game = GameState {
            location: assignment.location,
            spies: assignment.spies,
            started_at: now,
            ends_at: now + Duration::from_secs(u64::from(seconds)),
            remaining_secs: seconds,
            votes: Vec::new(),
        };
        for player in self.roster.connected_ids() {
            fx.unicast(player, game.started_event_for(player));
        }
        fx.broadcast(ServerEvent::StartTimer { seconds });
        fx.timer = Some(TimerAction::Start { seconds });

        tracing::info!(
            room_code = %self.code,
            players = self.roster.len(),
            spies = game.spies.len(),
            seconds,
            "game started"
        );
        tracing::debug!(room_code = %self.code, location = %game.location, "round location drawn");

        self.game = Some(game);
        self.last_result = None;
        Ok(fx)
    }

    /// Returns an Ended (or still Waiting) room to the lobby.
    pub fn reset(&mut self, caller: PlayerId) -> Result<Effects, RoomError> {
        if !self.roster.is_host(caller) {
            return Err(RoomError::Unauthorized("reset the room"));
        }
        if self.phase.is_active() {
            return Err(RoomError::GameInProgress(self.code.clone()));
        }

        if self.phase != Phase::Waiting {
            self.set_phase(Phase::Waiting)?;
        }
        self.roster.prune_disconnected();
        self.game = None;
        self.last_result = None;

        let mut fx = Effects::default();
        self.push_roster(&mut fx);
        self.can_start = self.roster.connected_count() >= self.config.min_players;
        fx.broadcast(ServerEvent::CanStartGame {
            can_start: self.can_start,
        });
        fx.timer = Some(TimerAction::Cancel);

        tracing::info!(room_code = %self.code, "room reset to lobby");
        Ok(fx)
    }

    // -- round play --------------------------------------------------------

    /// Applies one countdown tick. The final tick moves Playing to Voting.
    pub fn on_tick(&mut self, remaining: u32, expired: bool) -> Effects {
        let mut fx = Effects::default();
        if self.phase != Phase::Playing {
            tracing::debug!(room_code = %self.code, phase = %self.phase, "stale tick ignored");
            return fx;
        }
        let Some(game) = self.game.as_mut() else {
            return fx;
        };

        game.remaining_secs = remaining;
        fx.broadcast(ServerEvent::UpdateTimer { seconds: remaining });
        if !expired && remaining > 0 {
            return fx;
        }

        game.votes.clear();
        game.remaining_secs = 0;
        if let Err(e) = self.set_phase(Phase::Voting) {
            tracing::warn!(room_code = %self.code, error = %e, "countdown expiry ignored");
            return fx;
        }
        fx.broadcast(ServerEvent::StartVoting {});
        fx.timer = Some(TimerAction::BeginVoting);
        tracing::info!(room_code = %self.code, "voting started");
        fx
    }

    /// Re-sends `startVoting` if the room is still voting.
    pub fn voting_echo(&self) -> Effects {
        let mut fx = Effects::default();
        if self.phase == Phase::Voting {
            fx.broadcast(ServerEvent::StartVoting {});
        }
        fx
    }

    /// Chat. Dropped without error outside a round, from non-members, or
    /// when blank.
    pub fn send_message(&self, sender: PlayerId, message: &str) -> Effects {
        let mut fx = Effects::default();
        if !self.phase.allows_chat() {
            return fx;
        }
        let Some(player) = self.roster.get(sender) else {
            return fx;
        };
        let text = message.trim();
        if text.is_empty() {
            return fx;
        }

        let text: String = text.chars().take(self.config.max_message_len).collect();
        fx.broadcast(ServerEvent::ReceiveMessage {
            sender: player.name.clone(),
            message: text,
        });
        fx
    }

    /// Records or replaces `voter`'s accusation, then checks quorum.
    /// Ignored outside Voting.
    pub fn cast_vote(&mut self, voter: PlayerId, target: PlayerId) -> Result<Effects, RoomError> {
        let mut fx = Effects::default();
        if self.phase != Phase::Voting {
            tracing::debug!(room_code = %self.code, %voter, phase = %self.phase, "vote outside voting ignored");
            return Ok(fx);
        }
        if !self.roster.contains(voter) {
            return Err(RoomError::NotInRoom(voter, self.code.clone()));
        }
        if voter == target {
            return Err(RoomError::InvalidInput("you cannot vote for yourself".into()));
        }
        if !self.roster.contains(target) {
            return Err(RoomError::InvalidInput(
                "that player is not in this room".into(),
            ));
        }
        let Some(game) = self.game.as_mut() else {
            return Ok(fx);
        };

        match game.votes.iter_mut().find(|v| v.voter == voter) {
            Some(existing) => existing.target = target,
            None => game.votes.push(Vote { voter, target }),
        }

        fx.broadcast(ServerEvent::PlayerVoted {
            voter_id: voter,
            voter_name: self.roster.name_of(voter).to_string(),
        });
        self.check_quorum(&mut fx);
        Ok(fx)
    }

    /// Ends the round once the recorded votes reach the number of connected
    /// players. Votes cast by players who have since disconnected still count,
    /// both toward that number and in the tally.
    fn check_quorum(&mut self, fx: &mut Effects) {
        if self.phase != Phase::Voting {
            return;
        }
        let Some(game) = self.game.as_ref() else {
            return;
        };
        let connected = self.roster.connected_count();
        if connected == 0 || game.votes.len() < connected {
            return;
        }

        let result = tally(&game.votes, &game.spies, &game.location, &self.roster);
        tracing::info!(
            room_code = %self.code,
            outcome = ?result.outcome,
            votes = game.votes.len(),
            connected,
            "game over"
        );

        if let Err(e) = self.set_phase(Phase::Ended) {
            tracing::warn!(room_code = %self.code, error = %e, "tally discarded");
            return;
        }
        self.last_result = Some(result.clone());
        fx.broadcast(ServerEvent::GameOver(result));
        fx.timer = Some(TimerAction::Cancel);
    }

    // -- helpers -----------------------------------------------------------

    fn set_phase(&mut self, next: Phase) -> Result<(), RoomError> {
        if !self.phase.can_transition_to(next) {
            return Err(RoomError::InvalidState(format!(
                "room {} cannot move from {} to {}",
                self.code, self.phase, next
            )));
        }
        tracing::debug!(room_code = %self.code, from = %self.phase, to = %next, "phase change");
        self.phase = next;
        Ok(())
    }

    fn push_roster(&self, fx: &mut Effects) {
        if let Some(host) = self.roster.host() {
            fx.broadcast(ServerEvent::UpdatePlayers {
                players: self.roster.views(),
                host: host.name.clone(),
                host_id: host.id,
            });
        }
    }

    fn push_can_start_change(&mut self, fx: &mut Effects) {
        let can_start = self.roster.connected_count() >= self.config.min_players;
        if can_start != self.can_start {
            self.can_start = can_start;
            fx.broadcast(ServerEvent::CanStartGame { can_start });
        }
    }

    fn push_replay(&self, player: PlayerId, fx: &mut Effects) {
        match (self.phase, &self.game) {
            (Phase::Playing, Some(game)) => {
                fx.unicast(player, game.started_event_for(player));
                fx.unicast(
                    player,
                    ServerEvent::StartTimer {
                        seconds: game.remaining_secs,
                    },
                );
            }
            (Phase::Voting, Some(game)) => {
                fx.unicast(player, game.started_event_for(player));
                fx.unicast(player, ServerEvent::StartVoting {});
            }
            (Phase::Ended, _) => {
                if let Some(result) = &self.last_result {
                    fx.unicast(player, ServerEvent::GameOver(result.clone()));
                }
            }
            _ => {}
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use spyfall_protocol::Outcome;

    use super::*;

    const A: PlayerId = PlayerId(1);
    const B: PlayerId = PlayerId(2);
    const C: PlayerId = PlayerId(3);
    const D: PlayerId = PlayerId(4);
    const E: PlayerId = PlayerId(5);

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn code() -> RoomCode {
        RoomCode::from_number(12345)
    }

    fn new_room() -> Room {
        Room::create(code(), RoomConfig::default(), A, "A").unwrap().0
    }

    /// Room 12345 with A (host), B, C, D in Waiting.
    fn room_of_four() -> Room {
        let mut room = new_room();
        room.join(B, "B").unwrap();
        room.join(C, "C").unwrap();
        room.join(D, "D").unwrap();
        room
    }

    fn spy_c() -> Assignment {
        Assignment {
            location: "Bank".into(),
            spies: vec![C],
        }
    }

    /// Room of four in Voting with C as the spy.
    fn voting_room() -> Room {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        room.on_tick(0, true);
        assert_eq!(room.phase(), Phase::Voting);
        room
    }

    fn game_over(fx: &Effects) -> Option<&GameResult> {
        fx.events.iter().find_map(|(_, e)| match e {
            ServerEvent::GameOver(result) => Some(result),
            _ => None,
        })
    }

    fn count_became_host(fx: &Effects) -> usize {
        fx.events
            .iter()
            .filter(|(_, e)| matches!(e, ServerEvent::BecameHost {}))
            .count()
    }

    // =====================================================================
    // create / join
    // =====================================================================

    #[test]
    fn test_create_makes_creator_sole_host() {
        let (room, fx) = Room::create(code(), RoomConfig::default(), A, "  Ann  ").unwrap();

        assert_eq!(room.phase(), Phase::Waiting);
        assert_eq!(room.roster().len(), 1);
        assert_eq!(room.roster().host().map(|p| p.name.as_str()), Some("Ann"));
        assert!(matches!(
            fx.events_for(A)[0],
            ServerEvent::RoomCreated { is_host: true, .. }
        ));
    }

    #[test]
    fn test_create_rejects_blank_or_long_names() {
        let blank = Room::create(code(), RoomConfig::default(), A, "   ");
        assert!(matches!(blank, Err(RoomError::InvalidInput(_))));

        let long = "x".repeat(25);
        let too_long = Room::create(code(), RoomConfig::default(), A, &long);
        assert!(matches!(too_long, Err(RoomError::InvalidInput(_))));
    }

    #[test]
    fn test_join_grows_roster_by_one_and_dedupes_name() {
        let mut room = new_room();
        let fx = room.join(B, "A").unwrap();

        assert_eq!(room.roster().len(), 2);
        assert_eq!(room.roster().name_of(B), "A (2)");
        assert!(matches!(
            fx.events_for(B)[0],
            ServerEvent::RoomJoined { player_name, is_host: false, .. } if player_name == "A (2)"
        ));
        assert!(
            fx.events
                .iter()
                .any(|(to, e)| *to == Recipient::All && matches!(e, ServerEvent::UpdatePlayers { .. }))
        );
    }

    #[test]
    fn test_join_twice_is_idempotent() {
        let mut room = new_room();
        room.join(B, "B").unwrap();
        let fx = room.join(B, "Someone Else").unwrap();

        assert_eq!(room.roster().len(), 2);
        assert_eq!(room.roster().name_of(B), "B");
        assert!(matches!(
            fx.events_for(B)[0],
            ServerEvent::RoomJoined { player_name, .. } if player_name == "B"
        ));
    }

    #[test]
    fn test_join_full_room_is_rejected() {
        let mut room = room_of_four();
        room.update_settings(
            A,
            &SettingsPatch {
                max_players: Some(4),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(room.join(E, "E"), Err(RoomError::RoomFull(_))));
        assert_eq!(room.roster().len(), 4);
    }

    #[test]
    fn test_join_mid_game_by_stranger_is_rejected() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        assert!(matches!(
            room.join(E, "E"),
            Err(RoomError::GameInProgress(_))
        ));
    }

    #[test]
    fn test_can_start_is_announced_when_fourth_player_joins() {
        let mut room = new_room();
        room.join(B, "B").unwrap();
        let fx = room.join(C, "C").unwrap();
        assert!(
            !fx.events
                .iter()
                .any(|(_, e)| matches!(e, ServerEvent::CanStartGame { .. }))
        );

        let fx = room.join(D, "D").unwrap();
        assert!(
            fx.events
                .iter()
                .any(|(_, e)| *e == ServerEvent::CanStartGame { can_start: true })
        );

        let fx = room.leave(D).unwrap();
        assert!(
            fx.events
                .iter()
                .any(|(_, e)| *e == ServerEvent::CanStartGame { can_start: false })
        );
    }

    // =====================================================================
    // leave / host migration
    // =====================================================================

    #[test]
    fn test_leave_in_waiting_removes_player() {
        let mut room = room_of_four();
        room.leave(C).unwrap();
        assert_eq!(room.roster().len(), 3);
        assert!(!room.roster().contains(C));
    }

    #[test]
    fn test_leave_unknown_player_is_not_in_room() {
        let mut room = new_room();
        assert!(matches!(room.leave(E), Err(RoomError::NotInRoom(..))));
    }

    #[test]
    fn test_host_leaving_promotes_next_in_join_order_once() {
        let mut room = room_of_four();
        let fx = room.leave(A).unwrap();

        assert_eq!(count_became_host(&fx), 1);
        assert!(fx.events_for(B).contains(&&ServerEvent::BecameHost {}));
        assert!(room.roster().is_host(B));
        assert!(fx.events.iter().any(|(_, e)| matches!(
            e,
            ServerEvent::UpdatePlayers { host_id, .. } if *host_id == B
        )));
    }

    #[test]
    fn test_non_host_leaving_emits_no_became_host() {
        let mut room = room_of_four();
        let fx = room.leave(C).unwrap();
        assert_eq!(count_became_host(&fx), 0);
    }

    #[test]
    fn test_leave_mid_game_keeps_player_flagged_disconnected() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();

        let fx = room.leave(C).unwrap();
        assert_eq!(room.roster().len(), 4);
        assert!(!room.roster().get(C).unwrap().is_connected);
        assert!(fx.events.iter().any(|(_, e)| matches!(
            e,
            ServerEvent::PlayerDisconnected { player_id, .. } if *player_id == C
        )));

        // A second departure of the same player is a no-op.
        assert!(room.leave(C).unwrap().is_empty());
    }

    #[test]
    fn test_host_disconnect_mid_game_migrates_to_connected_player() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        room.leave(B).unwrap();

        let fx = room.leave(A).unwrap();
        assert_eq!(count_became_host(&fx), 1);
        assert!(room.roster().is_host(C), "B is disconnected, C is next");
    }

    #[test]
    fn test_room_is_abandoned_when_nobody_connected() {
        let mut room = new_room();
        room.join(B, "B").unwrap();
        room.leave(A).unwrap();
        assert!(!room.is_abandoned());
        room.leave(B).unwrap();
        assert!(room.is_abandoned());
    }

    // =====================================================================
    // settings
    // =====================================================================

    #[test]
    fn test_update_settings_merges_and_broadcasts() {
        let mut room = new_room();
        let fx = room
            .update_settings(
                A,
                &SettingsPatch {
                    game_time_minutes: Some(8),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(room.settings().game_time_minutes, 8);
        assert_eq!(room.settings().max_players, 8);
        assert!(matches!(
            fx.events[0],
            (Recipient::All, ServerEvent::SettingsUpdated { .. })
        ));
    }

    #[test]
    fn test_update_settings_by_non_host_is_unauthorized() {
        let mut room = room_of_four();
        let result = room.update_settings(B, &SettingsPatch::default());
        assert!(matches!(result, Err(RoomError::Unauthorized(_))));
    }

    #[test]
    fn test_update_settings_rejects_invalid_values_unchanged() {
        let mut room = room_of_four();
        let before = *room.settings();

        for patch in [
            SettingsPatch { max_players: Some(3), ..Default::default() },
            SettingsPatch { max_players: Some(17), ..Default::default() },
            SettingsPatch { game_time_minutes: Some(0), ..Default::default() },
            SettingsPatch { spies_count: Some(0), ..Default::default() },
            SettingsPatch { spies_count: Some(8), ..Default::default() },
        ] {
            let result = room.update_settings(A, &patch);
            assert!(matches!(result, Err(RoomError::InvalidInput(_))), "{patch:?}");
        }
        assert_eq!(*room.settings(), before);
    }

    // =====================================================================
    // startGame
    // =====================================================================

    #[test]
    fn test_start_game_requires_host() {
        let mut room = room_of_four();
        let mut rng = StdRng::seed_from_u64(1);
        let result = room.start_game(B, &mut rng, now());
        assert!(matches!(result, Err(RoomError::Unauthorized(_))));
        assert_eq!(room.phase(), Phase::Waiting);
    }

    #[test]
    fn test_start_game_requires_four_connected() {
        let mut room = new_room();
        room.join(B, "B").unwrap();
        room.join(C, "C").unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let result = room.start_game(A, &mut rng, now());
        assert!(matches!(
            result,
            Err(RoomError::NotEnoughPlayers { needed: 4, connected: 3 })
        ));
    }

    #[test]
    fn test_start_game_rejects_too_many_spies() {
        let mut room = room_of_four();
        room.update_settings(
            A,
            &SettingsPatch {
                spies_count: Some(4),
                ..Default::default()
            },
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let result = room.start_game(A, &mut rng, now());
        assert!(matches!(result, Err(RoomError::InvalidInput(_))));
    }

    #[test]
    fn test_start_game_while_playing_is_game_in_progress() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            room.start_game(A, &mut rng, now()),
            Err(RoomError::GameInProgress(_))
        ));
    }

    #[test]
    fn test_start_game_deals_roles_and_starts_timer() {
        let mut room = room_of_four();
        let fx = room.start_game_with(A, spy_c(), now()).unwrap();

        assert_eq!(room.phase(), Phase::Playing);
        assert_eq!(fx.timer, Some(TimerAction::Start { seconds: 300 }));

        for player in [A, B, D] {
            match fx.events_for(player)[0] {
                ServerEvent::GameStarted { role, location, all_locations, timer } => {
                    assert_eq!(*role, Role::Civilian);
                    assert_eq!(location, "Bank");
                    assert_eq!(all_locations.len(), 12);
                    assert_eq!(*timer, 300);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        match fx.events_for(C)[0] {
            ServerEvent::GameStarted { role, location, .. } => {
                assert_eq!(*role, Role::Spy);
                assert_eq!(location, UNKNOWN_LOCATION);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(
            fx.events
                .iter()
                .any(|(to, e)| *to == Recipient::All && *e == ServerEvent::StartTimer { seconds: 300 })
        );

        let game = room.game().unwrap();
        assert_eq!(game.ends_at, now() + Duration::from_secs(300));
    }

    #[test]
    fn test_start_game_with_rejects_bad_assignment() {
        let mut room = room_of_four();
        let bad = Assignment {
            location: "Bank".into(),
            spies: vec![E],
        };
        assert!(matches!(
            room.start_game_with(A, bad, now()),
            Err(RoomError::InvalidInput(_))
        ));
        assert_eq!(room.phase(), Phase::Waiting);
    }

    #[test]
    fn test_start_game_random_picks_exact_distinct_spies() {
        let mut room = room_of_four();
        for _ in 4..8 {
            let id = PlayerId(room.roster().len() as u64 + 1);
            room.join(id, "P").unwrap();
        }
        room.update_settings(
            A,
            &SettingsPatch {
                spies_count: Some(3),
                ..Default::default()
            },
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(99);
        room.start_game(A, &mut rng, now()).unwrap();

        let game = room.game().unwrap();
        let mut spies = game.spies.clone();
        spies.sort_unstable();
        spies.dedup();
        assert_eq!(spies.len(), 3);
        assert!(spies.iter().all(|s| room.roster().contains(*s)));
        assert!(LOCATIONS.contains(&game.location.as_str()));
    }

    #[test]
    fn test_assignment_draw_is_roughly_uniform() {
        let eligible = [A, B, C, D];
        let mut rng = StdRng::seed_from_u64(2024);
        let mut hits = [0usize; 4];
        for _ in 0..4_000 {
            let a = Assignment::draw(&mut rng, &eligible, 1);
            let index = eligible.iter().position(|p| *p == a.spies[0]).unwrap();
            hits[index] += 1;
        }
        for h in hits {
            assert!((800..1200).contains(&h), "skewed spy selection: {hits:?}");
        }
    }

    #[test]
    fn test_restart_from_ended_keeps_roster() {
        let mut room = room_of_four();
        room.join(E, "E").unwrap();
        room.start_game_with(A, spy_c(), now()).unwrap();
        room.leave(E).unwrap();
        room.on_tick(0, true);
        for (voter, target) in [(A, C), (B, C), (C, A), (D, C)] {
            room.cast_vote(voter, target).unwrap();
        }
        assert_eq!(room.phase(), Phase::Ended);

        let again = Assignment {
            location: "Casino".into(),
            spies: vec![B],
        };
        let fx = room.start_game_with(A, again, now()).unwrap();
        assert_eq!(room.phase(), Phase::Playing);
        assert_eq!(room.roster().len(), 5);
        assert!(!room.roster().get(E).unwrap().is_connected);
        assert!(
            fx.events.iter().all(|(to, _)| *to != Recipient::Player(E)),
            "E is not dealt in while away"
        );
        assert!(room.game().unwrap().votes.is_empty());

        let fx = room.reconnect(E).unwrap();
        assert!(fx.events_for(E).iter().any(|e| matches!(
            e,
            ServerEvent::GameStarted { role: Role::Civilian, location, .. } if location == "Casino"
        )));
    }

    // =====================================================================
    // ticks / voting
    // =====================================================================

    #[test]
    fn test_ticks_broadcast_remaining_and_final_tick_starts_voting() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();

        let fx = room.on_tick(299, false);
        assert_eq!(fx.events[0].1, ServerEvent::UpdateTimer { seconds: 299 });
        assert_eq!(room.game().unwrap().remaining_secs, 299);
        assert_eq!(room.phase(), Phase::Playing);

        let fx = room.on_tick(0, true);
        assert_eq!(room.phase(), Phase::Voting);
        assert_eq!(fx.timer, Some(TimerAction::BeginVoting));
        assert!(fx.events.iter().any(|(_, e)| *e == ServerEvent::StartVoting {}));
    }

    #[test]
    fn test_stale_tick_outside_playing_is_ignored() {
        let mut room = room_of_four();
        assert!(room.on_tick(10, false).is_empty());
    }

    #[test]
    fn test_voting_echo_only_while_voting() {
        let mut room = voting_room();
        assert_eq!(room.voting_echo().events.len(), 1);

        for (voter, target) in [(A, C), (B, C), (C, A), (D, C)] {
            room.cast_vote(voter, target).unwrap();
        }
        assert!(room.voting_echo().is_empty());
    }

    #[test]
    fn test_scenario_civilians_catch_the_spy() {
        let mut room = voting_room();

        for (voter, target) in [(A, C), (B, C), (D, C)] {
            let fx = room.cast_vote(voter, target).unwrap();
            assert!(game_over(&fx).is_none(), "quorum not reached yet");
        }
        let fx = room.cast_vote(C, A).unwrap();
        let result = game_over(&fx).expect("quorum reached");

        assert_eq!(result.outcome, Outcome::CiviliansWin);
        assert!(!result.spy_wins);
        assert_eq!(result.accused_player.as_deref(), Some("C"));
        assert_eq!(result.spies, ["C"]);
        assert_eq!(result.location, "Bank");
        assert_eq!(room.phase(), Phase::Ended);
        assert_eq!(fx.timer, Some(TimerAction::Cancel));
    }

    #[test]
    fn test_scenario_two_two_split_is_tie() {
        let mut room = voting_room();
        room.cast_vote(A, B).unwrap();
        room.cast_vote(C, D).unwrap();
        room.cast_vote(B, D).unwrap();
        let fx = room.cast_vote(D, B).unwrap();

        let result = game_over(&fx).expect("quorum reached");
        assert_eq!(result.outcome, Outcome::Tie);
        assert!(result.spy_wins);
        assert_eq!(result.accused_player, None);
    }

    #[test]
    fn test_player_voted_never_names_target() {
        let mut room = voting_room();
        let fx = room.cast_vote(A, C).unwrap();
        assert_eq!(
            fx.events,
            vec![(
                Recipient::All,
                ServerEvent::PlayerVoted {
                    voter_id: A,
                    voter_name: "A".into()
                }
            )]
        );
    }

    #[test]
    fn test_recast_vote_overwrites() {
        let mut room = voting_room();
        room.cast_vote(A, B).unwrap();
        room.cast_vote(A, C).unwrap();

        let votes = &room.game().unwrap().votes;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0], Vote { voter: A, target: C });
    }

    #[test]
    fn test_vote_for_self_or_stranger_is_invalid() {
        let mut room = voting_room();
        assert!(matches!(room.cast_vote(A, A), Err(RoomError::InvalidInput(_))));
        assert!(matches!(room.cast_vote(A, E), Err(RoomError::InvalidInput(_))));
        assert!(room.game().unwrap().votes.is_empty());
    }

    #[test]
    fn test_vote_outside_voting_is_ignored() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        let fx = room.cast_vote(A, C).unwrap();
        assert!(fx.is_empty());
        assert!(room.game().unwrap().votes.is_empty());
    }

    #[test]
    fn test_quorum_excludes_disconnected_players() {
        let mut room = voting_room();
        room.leave(D).unwrap();

        room.cast_vote(A, C).unwrap();
        room.cast_vote(B, C).unwrap();
        let fx = room.cast_vote(C, A).unwrap();

        let result = game_over(&fx).expect("three connected voters are a quorum");
        assert_eq!(result.outcome, Outcome::CiviliansWin);
    }

    #[test]
    fn test_quorum_reevaluated_when_last_holdout_leaves() {
        let mut room = voting_room();
        room.cast_vote(A, C).unwrap();
        room.cast_vote(B, C).unwrap();
        room.cast_vote(C, A).unwrap();
        assert_eq!(room.phase(), Phase::Voting);

        let fx = room.leave(D).unwrap();
        assert!(game_over(&fx).is_some());
        assert_eq!(room.phase(), Phase::Ended);
    }

    #[test]
    fn test_disconnected_voter_counts_toward_quorum_and_tally() {
        let mut room = voting_room();
        room.cast_vote(D, B).unwrap();
        room.leave(D).unwrap();

        let fx = room.cast_vote(A, B).unwrap();
        assert!(game_over(&fx).is_none(), "2 votes, 3 connected");
        assert_eq!(room.phase(), Phase::Voting);

        // B has not voted, but three votes now match three connected players.
        let fx = room.cast_vote(C, A).unwrap();
        let result = game_over(&fx).expect("votes reached the connected count");
        assert_eq!(room.phase(), Phase::Ended);
        assert_eq!(result.accused_player.as_deref(), Some("B"));
        assert_eq!(result.outcome, Outcome::SpyWins);
        assert_eq!(result.votes.len(), 3);

        assert!(room.cast_vote(B, C).unwrap().is_empty());
    }

    #[test]
    fn test_quorum_counts_votes_not_voters() {
        let mut room = voting_room();
        room.cast_vote(A, C).unwrap();
        room.cast_vote(B, C).unwrap();
        room.cast_vote(D, C).unwrap();
        assert_eq!(room.phase(), Phase::Voting);

        // C never votes; B leaving brings the connected count down to three.
        let fx = room.leave(B).unwrap();
        assert!(game_over(&fx).is_some());
        assert_eq!(room.phase(), Phase::Ended);
        assert_eq!(room.last_result().unwrap().outcome, Outcome::CiviliansWin);
    }

    // =====================================================================
    // reconnection replay
    // =====================================================================

    #[test]
    fn test_reconnect_mid_round_replays_role_and_clock() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        room.on_tick(120, false);
        room.leave(C).unwrap();

        let fx = room.join(C, "C").unwrap();
        let events = fx.events_for(C);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::GameStarted { role: Role::Spy, timer: 120, .. }
        )));
        assert!(events.contains(&&ServerEvent::StartTimer { seconds: 120 }));
        assert!(room.roster().get(C).unwrap().is_connected);
    }

    #[test]
    fn test_rejoin_with_blank_name_still_reconnects() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        room.leave(B).unwrap();

        let fx = room.join(B, "   ").unwrap();
        assert!(room.roster().get(B).unwrap().is_connected);
        assert!(fx.events_for(B).iter().any(|e| matches!(
            e,
            ServerEvent::RoomJoined { player_name, .. } if player_name == "B"
        )));
        assert!(matches!(room.join(E, "  "), Err(RoomError::InvalidInput(_))));
    }

    #[test]
    fn test_reconnect_during_voting_replays_start_voting() {
        let mut room = voting_room();
        room.leave(B).unwrap();
        let fx = room.reconnect(B).unwrap();
        assert!(fx.events_for(B).contains(&&ServerEvent::StartVoting {}));
    }

    #[test]
    fn test_reconnect_into_ended_room_replays_result() {
        let mut room = voting_room();
        room.leave(D).unwrap();
        for (voter, target) in [(A, C), (B, C), (C, A)] {
            room.cast_vote(voter, target).unwrap();
        }
        assert_eq!(room.phase(), Phase::Ended);

        let fx = room.reconnect(D).unwrap();
        assert!(
            fx.events_for(D)
                .iter()
                .any(|e| matches!(e, ServerEvent::GameOver(r) if r.outcome == Outcome::CiviliansWin))
        );
    }

    #[test]
    fn test_reconnect_raises_quorum_requirement() {
        let mut room = voting_room();
        room.leave(D).unwrap();
        room.reconnect(D).unwrap();

        room.cast_vote(A, C).unwrap();
        room.cast_vote(B, C).unwrap();
        let fx = room.cast_vote(C, A).unwrap();
        assert!(game_over(&fx).is_none(), "D is connected again and must vote");
    }

    // =====================================================================
    // chat / reset
    // =====================================================================

    #[test]
    fn test_chat_only_during_round() {
        let mut room = room_of_four();
        assert!(room.send_message(A, "hello").is_empty());

        room.start_game_with(A, spy_c(), now()).unwrap();
        let fx = room.send_message(B, "  where are we?  ");
        assert_eq!(
            fx.events[0].1,
            ServerEvent::ReceiveMessage {
                sender: "B".into(),
                message: "where are we?".into()
            }
        );
        assert!(room.send_message(B, "   ").is_empty());
        assert!(room.send_message(E, "hi").is_empty());
    }

    #[test]
    fn test_chat_truncates_long_messages() {
        let mut room = room_of_four();
        room.start_game_with(A, spy_c(), now()).unwrap();
        let fx = room.send_message(B, &"é".repeat(600));
        match &fx.events[0].1 {
            ServerEvent::ReceiveMessage { message, .. } => assert_eq!(message.chars().count(), 500),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reset_returns_ended_room_to_waiting() {
        let mut room = voting_room();
        room.leave(D).unwrap();
        for (voter, target) in [(A, C), (B, C), (C, A)] {
            room.cast_vote(voter, target).unwrap();
        }

        assert!(matches!(room.reset(B), Err(RoomError::Unauthorized(_))));
        let fx = room.reset(A).unwrap();

        assert_eq!(room.phase(), Phase::Waiting);
        assert!(room.game().is_none());
        assert!(room.last_result().is_none());
        assert_eq!(room.roster().len(), 3, "disconnected D is pruned");
        assert!(
            fx.events
                .iter()
                .any(|(_, e)| *e == ServerEvent::CanStartGame { can_start: false })
        );
        assert_eq!(fx.timer, Some(TimerAction::Cancel));
    }

    #[test]
    fn test_phase_changes_follow_transition_table() {
        let mut room = room_of_four();
        assert!(matches!(
            room.set_phase(Phase::Voting),
            Err(RoomError::InvalidState(_))
        ));
        assert_eq!(room.phase(), Phase::Waiting);

        room.start_game_with(A, spy_c(), now()).unwrap();
        assert!(matches!(
            room.set_phase(Phase::Ended),
            Err(RoomError::InvalidState(_))
        ));
        assert_eq!(room.phase(), Phase::Playing);
    }

    #[test]
    fn test_reset_from_waiting_is_allowed() {
        let mut room = room_of_four();
        room.reset(A).unwrap();
        assert_eq!(room.phase(), Phase::Waiting);
    }

    #[test]
    fn test_reset_during_round_is_rejected() {
        let mut room = voting_room();
        assert!(matches!(room.reset(A), Err(RoomError::GameInProgress(_))));
    }
}
