//! Room actor: an isolated Tokio task that owns one [`Room`].
//!
//! The actor is the room's only writer. Commands arrive on a bounded mpsc
//! channel; countdown ticks and `startVoting` re-deliveries are branches of
//! the same `select!` loop. Each step runs to completion before the next
//! one starts, so ticks and commands never interleave within a room.

use std::collections::HashMap;
use std::time::SystemTime;

use rand::rngs::StdRng;
use spyfall_protocol::{
    PlayerId, PlayerView, Recipient, RoomCode, ServerEvent, Settings, SettingsPatch,
};
use spyfall_tick::{Countdown, Redelivery};
use tokio::sync::{mpsc, oneshot};

use crate::{Effects, Phase, Room, RoomError, TimerAction};

/// Channel for delivering events to one player's connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// Room-scoped commands routed to an existing room.
#[derive(Debug, Clone)]
pub enum RoomRequest {
    UpdateSettings(SettingsPatch),
    StartGame,
    SendMessage(String),
    CastVote(PlayerId),
    Reset,
}

/// Result of a departure, for the registry's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// The player was taken off the roster (as opposed to flagged
    /// disconnected mid-round).
    pub removed: bool,
    /// Nobody connected is left; the room should be destroyed.
    pub abandoned: bool,
}

/// Round details in a [`RoomSnapshot`].
#[derive(Debug, Clone)]
pub struct GameSnapshot {
    pub location: String,
    pub spies: Vec<PlayerId>,
    pub remaining_secs: u32,
    pub votes: usize,
}

/// A point-in-time view of a room, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub phase: Phase,
    pub settings: Settings,
    pub players: Vec<PlayerView>,
    pub game: Option<GameSnapshot>,
    pub countdown_running: bool,
}

pub(crate) enum RoomCommand {
    Join {
        player: PlayerId,
        name: String,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// Re-bind an existing member to a new connection.
    Reattach {
        player: PlayerId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<Departure, RoomError>>,
    },
    Request {
        player: PlayerId,
        request: RoomRequest,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Sends a command and waits for the actor's reply.
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    pub async fn join(
        &self,
        player: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.call(|reply| RoomCommand::Join {
            player,
            name,
            sender,
            reply,
        })
        .await?
    }

    pub async fn reattach(&self, player: PlayerId, sender: PlayerSender) -> Result<(), RoomError> {
        self.call(|reply| RoomCommand::Reattach {
            player,
            sender,
            reply,
        })
        .await?
    }

    pub async fn leave(&self, player: PlayerId) -> Result<Departure, RoomError> {
        self.call(|reply| RoomCommand::Leave { player, reply })
            .await?
    }

    pub async fn request(&self, player: PlayerId, request: RoomRequest) -> Result<(), RoomError> {
        self.call(|reply| RoomCommand::Request {
            player,
            request,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.call(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Tells the room to cancel its timers and stop.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    /// Per-player outbound channels, replaced on reconnect.
    senders: HashMap<PlayerId, PlayerSender>,
    countdown: Countdown,
    redelivery: Redelivery,
    rng: StdRng,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::debug!(room_code = %self.room.code(), "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                tick = self.countdown.wait_for_tick() => {
                    let fx = self.room.on_tick(tick.remaining, tick.expired);
                    self.apply(fx);
                }
                _ = self.redelivery.wait() => {
                    tracing::trace!(room_code = %self.room.code(), "re-sending startVoting");
                    let fx = self.room.voting_echo();
                    self.apply(fx);
                }
            }
        }

        self.countdown.cancel();
        self.redelivery.cancel();
        tracing::info!(room_code = %self.room.code(), "room destroyed");
    }

    /// Returns `false` when the actor should stop.
    fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                player,
                name,
                sender,
                reply,
            } => {
                let result = self.room.join(player, &name).map(|fx| {
                    self.senders.insert(player, sender);
                    self.apply(fx);
                });
                let _ = reply.send(result);
            }
            RoomCommand::Reattach {
                player,
                sender,
                reply,
            } => {
                let result = self.room.reconnect(player).map(|fx| {
                    self.senders.insert(player, sender);
                    self.apply(fx);
                });
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player, reply } => {
                let result = self.room.leave(player).map(|fx| {
                    self.apply(fx);
                    self.senders.remove(&player);
                    Departure {
                        removed: !self.room.roster().contains(player),
                        abandoned: self.room.is_abandoned(),
                    }
                });
                let _ = reply.send(result);
            }
            RoomCommand::Request {
                player,
                request,
                reply,
            } => {
                let result = self.handle_request(player, request);
                if let Err(e) = &result {
                    tracing::debug!(room_code = %self.room.code(), %player, error = %e, "request rejected");
                }
                let _ = reply.send(result);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::Shutdown => return false,
        }
        true
    }

    fn handle_request(&mut self, player: PlayerId, request: RoomRequest) -> Result<(), RoomError> {
        let fx = match request {
            RoomRequest::UpdateSettings(patch) => self.room.update_settings(player, &patch)?,
            RoomRequest::StartGame => {
                self.room
                    .start_game(player, &mut self.rng, SystemTime::now())?
            }
            RoomRequest::SendMessage(message) => self.room.send_message(player, &message),
            RoomRequest::CastVote(target) => self.room.cast_vote(player, target)?,
            RoomRequest::Reset => self.room.reset(player)?,
        };
        self.apply(fx);
        Ok(())
    }

    /// Delivers events, then applies the timer directive.
    fn apply(&mut self, fx: Effects) {
        for (recipient, event) in fx.events {
            match recipient {
                Recipient::Player(player) => self.send_to(player, event),
                Recipient::All => {
                    for player in self.room.roster().connected_ids() {
                        self.send_to(player, event.clone());
                    }
                }
            }
        }

        match fx.timer {
            Some(TimerAction::Start { seconds }) => {
                self.redelivery.cancel();
                self.countdown.start(seconds);
            }
            Some(TimerAction::BeginVoting) => {
                self.countdown.cancel();
                self.redelivery.arm();
            }
            Some(TimerAction::Cancel) => {
                self.countdown.cancel();
                self.redelivery.cancel();
            }
            None => {}
        }
    }

    /// Sends to one player. Drops silently if their connection is gone.
    fn send_to(&self, player: PlayerId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(&player) {
            if sender.send(event).is_err() {
                tracing::trace!(room_code = %self.room.code(), %player, "outbound channel closed");
            }
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.room.code().clone(),
            phase: self.room.phase(),
            settings: *self.room.settings(),
            players: self.room.roster().views(),
            game: self.room.game().map(|g| GameSnapshot {
                location: g.location.clone(),
                spies: g.spies.clone(),
                remaining_secs: g.remaining_secs,
                votes: g.votes.len(),
            }),
            countdown_running: self.countdown.is_running(),
        }
    }
}

/// Spawns a room actor around an already-created room and delivers the
/// creation effects to `host`.
pub(crate) fn spawn_room(
    room: Room,
    created: Effects,
    host: PlayerId,
    host_sender: PlayerSender,
    rng: StdRng,
) -> RoomHandle {
    let config = room.config().clone();
    let code = room.code().clone();
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));

    let mut actor = RoomActor {
        room,
        senders: HashMap::from([(host, host_sender)]),
        countdown: Countdown::new(config.tick_period()),
        redelivery: Redelivery::new(config.voting_echo_delays()),
        rng,
        receiver: rx,
    };
    actor.apply(created);

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
