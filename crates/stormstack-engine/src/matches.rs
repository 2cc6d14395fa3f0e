//! Match records and their state machine.
//!
//! `Created → Running → (Finished | Error)`; both terminal states are
//! absorbing. Transitions are idempotent: re-applying a transition the
//! match already holds is a no-op success.

use crate::events::{ErrorRecord, ErrorRing};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stormstack_core::{MatchId, PlayerId, Result, StormError};

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchStatus {
    /// Created, not yet ticking.
    Created,
    /// Ticking; accepts commands and player joins.
    Running,
    /// Completed normally. Absorbing.
    Finished,
    /// Failed. Absorbing.
    Error,
}

impl MatchStatus {
    /// Whether the match is in a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// A match hosted by a container.
#[derive(Debug)]
pub struct MatchRecord {
    /// The match id, allocated by the control plane (or locally for
    /// single-node deployments).
    pub id: MatchId,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// Strictly monotonic tick counter; advances by exactly 1 per tick.
    pub current_tick: u64,
    /// Players admitted to the match.
    pub players: Vec<PlayerId>,
    /// Admission cap.
    pub player_limit: u32,
    /// Bounded ring of captured command/system failures.
    pub errors: ErrorRing,
    /// Consecutive failure count per system name, for the two-strikes rule.
    pub system_failures: HashMap<String, u32>,
}

impl MatchRecord {
    /// Create a match in `Created`.
    #[must_use]
    pub fn new(id: MatchId, player_limit: u32) -> Self {
        Self {
            id,
            status: MatchStatus::Created,
            current_tick: 0,
            players: Vec::new(),
            player_limit,
            errors: ErrorRing::new(),
            system_failures: HashMap::new(),
        }
    }

    /// Transition to `Running`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` from a terminal state.
    pub fn start(&mut self) -> Result<()> {
        match self.status {
            MatchStatus::Created => {
                self.status = MatchStatus::Running;
                Ok(())
            }
            MatchStatus::Running => Ok(()),
            terminal => Err(StormError::InvalidState(format!(
                "cannot start match {} from {terminal:?}",
                self.id
            ))),
        }
    }

    /// Transition to `Finished`. Idempotent; absorbing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when the match already errored.
    pub fn finish(&mut self) -> Result<()> {
        match self.status {
            MatchStatus::Finished => Ok(()),
            MatchStatus::Error => Err(StormError::InvalidState(format!(
                "cannot finish match {} from Error",
                self.id
            ))),
            _ => {
                self.status = MatchStatus::Finished;
                Ok(())
            }
        }
    }

    /// Transition to `Error`. Idempotent; absorbing.
    pub fn mark_error(&mut self) {
        if self.status != MatchStatus::Finished {
            self.status = MatchStatus::Error;
        }
    }

    /// Admit a player.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the match is `Running`, and
    /// `MatchFull` at the player limit. Re-joining is a no-op success.
    pub fn join(&mut self, player: PlayerId) -> Result<()> {
        if self.status != MatchStatus::Running {
            return Err(StormError::InvalidState(format!(
                "match {} is {:?}, join requires Running",
                self.id, self.status
            )));
        }
        if self.players.contains(&player) {
            return Ok(());
        }
        if self.players.len() as u32 >= self.player_limit {
            return Err(StormError::MatchFull {
                player_limit: self.player_limit,
                current_players: self.players.len() as u32,
            });
        }
        self.players.push(player);
        Ok(())
    }

    /// Record a captured failure.
    pub fn record_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Note a system failure; returns true when this is the second
    /// consecutive failure of the same system and the match must error.
    pub fn note_system_failure(&mut self, system: &str) -> bool {
        let count = self
            .system_failures
            .entry(system.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        *count >= 2
    }

    /// Clear the consecutive-failure count after a successful run.
    pub fn note_system_success(&mut self, system: &str) {
        self.system_failures.remove(system);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let mut m = MatchRecord::new(MatchId(1), 4);
        assert_eq!(m.status, MatchStatus::Created);
        m.start().expect("start");
        assert_eq!(m.status, MatchStatus::Running);
        m.finish().expect("finish");
        assert_eq!(m.status, MatchStatus::Finished);
        assert!(m.status.is_terminal());
    }

    #[test]
    fn transitions_are_idempotent() {
        let mut m = MatchRecord::new(MatchId(1), 4);
        m.start().expect("start");
        m.start().expect("start twice");
        m.finish().expect("finish");
        m.finish().expect("finish twice");
        m.mark_error();
        // Finished is absorbing: mark_error after finish is swallowed.
        assert_eq!(m.status, MatchStatus::Finished);
    }

    #[test]
    fn terminal_states_absorb() {
        let mut m = MatchRecord::new(MatchId(1), 4);
        m.start().expect("start");
        m.mark_error();
        assert_eq!(m.status, MatchStatus::Error);
        assert!(m.start().is_err());
        assert!(m.finish().is_err());
        m.mark_error();
        assert_eq!(m.status, MatchStatus::Error);
    }

    #[test]
    fn join_requires_running() {
        let mut m = MatchRecord::new(MatchId(1), 4);
        assert!(matches!(
            m.join(PlayerId(1)),
            Err(StormError::InvalidState(_))
        ));
        m.start().expect("start");
        m.join(PlayerId(1)).expect("join");
        assert_eq!(m.players, vec![PlayerId(1)]);
    }

    #[test]
    fn join_full_match_fails_with_details() {
        let mut m = MatchRecord::new(MatchId(1), 1);
        m.start().expect("start");
        m.join(PlayerId(1)).expect("join");

        match m.join(PlayerId(2)) {
            Err(StormError::MatchFull {
                player_limit,
                current_players,
            }) => {
                assert_eq!(player_limit, 1);
                assert_eq!(current_players, 1);
            }
            other => panic!("expected MatchFull, got {other:?}"),
        }
    }

    #[test]
    fn rejoin_is_noop() {
        let mut m = MatchRecord::new(MatchId(1), 1);
        m.start().expect("start");
        m.join(PlayerId(1)).expect("join");
        m.join(PlayerId(1)).expect("rejoin");
        assert_eq!(m.players.len(), 1);
    }

    #[test]
    fn two_consecutive_system_failures_trip() {
        let mut m = MatchRecord::new(MatchId(1), 4);
        assert!(!m.note_system_failure("movement"));
        assert!(m.note_system_failure("movement"));
    }

    #[test]
    fn success_resets_failure_streak() {
        let mut m = MatchRecord::new(MatchId(1), 4);
        assert!(!m.note_system_failure("movement"));
        m.note_system_success("movement");
        assert!(!m.note_system_failure("movement"));
    }
}
