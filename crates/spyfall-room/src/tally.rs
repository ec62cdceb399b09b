//! Vote tallying.
//!
//! Pure: no room state is touched, so the outcome rules are tested on their
//! own.

use std::collections::HashMap;

use spyfall_protocol::{GameResult, Outcome, PlayerId, VoteReveal};

use crate::Roster;

/// One voter's current accusation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub voter: PlayerId,
    pub target: PlayerId,
}

/// Computes the round result.
///
/// The single most-voted player is accused: civilians win if they are a spy,
/// otherwise the spies win. A shared maximum, or no votes at all, is a tie
/// and the spies escape regardless of who was tied.
pub fn tally(votes: &[Vote], spies: &[PlayerId], location: &str, roster: &Roster) -> GameResult {
    let mut counts: HashMap<PlayerId, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.target).or_default() += 1;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<PlayerId> = counts
        .iter()
        .filter(|&(_, &n)| n == max)
        .map(|(&id, _)| id)
        .collect();

    let accused = match leaders.as_slice() {
        [only] if max > 0 => Some(*only),
        _ => None,
    };

    let several = spies.len() > 1;
    let (outcome, message) = match accused {
        None => (
            Outcome::Tie,
            if several {
                "The vote ended in a tie. The spies escape!".to_string()
            } else {
                "The vote ended in a tie. The spy escapes!".to_string()
            },
        ),
        Some(id) if spies.contains(&id) => (
            Outcome::CiviliansWin,
            format!(
                "{} was {} spy. The civilians win!",
                roster.name_of(id),
                if several { "a" } else { "the" }
            ),
        ),
        Some(id) => (
            Outcome::SpyWins,
            if several {
                format!("{} was not a spy. The spies win!", roster.name_of(id))
            } else {
                format!("{} was not the spy. The spy wins!", roster.name_of(id))
            },
        ),
    };

    GameResult {
        outcome,
        message,
        spy_wins: outcome.spy_wins(),
        spies: spies.iter().map(|&id| roster.name_of(id).to_string()).collect(),
        location: location.to_string(),
        accused_player: accused.map(|id| roster.name_of(id).to_string()),
        votes: votes
            .iter()
            .map(|v| VoteReveal {
                voter: roster.name_of(v.voter).to_string(),
                target: roster.name_of(v.target).to_string(),
            })
            .collect(),
    }
}
