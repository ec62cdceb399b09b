//! Room roster: players in join order, display-name de-duplication and host
//! succession.

use spyfall_protocol::{PlayerId, PlayerView};

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    /// Unique within the room.
    pub name: String,
    pub is_host: bool,
    pub is_connected: bool,
}

impl Player {
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            is_host: self.is_host,
            is_connected: self.is_connected,
        }
    }
}

/// The ordered player list of a room.
///
/// Keeps exactly one host while non-empty, as long as somebody is connected
/// to take the role.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.get(id).is_some()
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.get(id).is_some_and(|p| p.is_host)
    }

    /// Display name for `id`, or an empty string for an unknown player.
    pub fn name_of(&self, id: PlayerId) -> &str {
        self.get(id).map(|p| p.name.as_str()).unwrap_or_default()
    }

    pub fn connected(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_connected)
    }

    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.connected().map(|p| p.id).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    pub fn views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    /// Returns `wanted` if no player uses it yet, otherwise the first free
    /// `"wanted (n)"` for n = 2, 3, ...
    pub fn unique_name(&self, wanted: &str) -> String {
        let taken = |name: &str| self.players.iter().any(|p| p.name == name);
        if !taken(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{wanted} ({n})"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| wanted.to_string())
    }

    /// Appends a connected player under a de-duplicated name. The first
    /// player added to an empty roster becomes host.
    pub fn add(&mut self, id: PlayerId, wanted_name: &str) -> &Player {
        let name = self.unique_name(wanted_name);
        let is_host = self.players.is_empty();
        let index = self.players.len();
        self.players.push(Player {
            id,
            name,
            is_host,
            is_connected: true,
        });
        &self.players[index]
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(index))
    }

    /// Sets the connected flag. Returns `false` if the player is unknown.
    pub fn set_connected(&mut self, id: PlayerId, connected: bool) -> bool {
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.is_connected = connected;
                true
            }
            None => false,
        }
    }

    /// Hands the host role to the first connected player in join order if
    /// nobody connected holds it. Returns the newly promoted player.
    pub fn ensure_host(&mut self) -> Option<PlayerId> {
        if self.players.iter().any(|p| p.is_host && p.is_connected) {
            return None;
        }
        let successor = self.players.iter().position(|p| p.is_connected)?;
        for p in &mut self.players {
            p.is_host = false;
        }
        self.players[successor].is_host = true;
        Some(self.players[successor].id)
    }

    /// Drops every disconnected player, returning their ids.
    pub fn prune_disconnected(&mut self) -> Vec<PlayerId> {
        let pruned: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| !p.is_connected)
            .map(|p| p.id)
            .collect();
        self.players.retain(|p| p.is_connected);
        pruned
    }
}
