//! Per-match error event ring.
//!
//! Failures inside command execution never abort a tick; they are
//! captured here, kept in a bounded ring per match, and broadcast to
//! `receive_errors`-scoped stream subscribers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use stormstack_core::{MatchId, PlayerId};

/// Default ring capacity per match.
pub const ERROR_RING_CAPACITY: usize = 256;

/// A captured per-command failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Tick during which the failure occurred.
    pub tick: u64,
    /// The command (or system) that failed.
    pub command: String,
    /// The issuing player, when the failure came from a command.
    pub player_id: Option<PlayerId>,
    /// Failure description.
    pub message: String,
}

/// An error record paired with its match, as streamed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// The match the failure belongs to.
    pub match_id: MatchId,
    /// The captured record.
    pub record: ErrorRecord,
}

/// Bounded FIFO of error records; the oldest record is dropped when full.
#[derive(Debug, Clone, Default)]
pub struct ErrorRing {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorRing {
    /// Create a ring with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(ERROR_RING_CAPACITY)
    }

    /// Create a ring with an explicit capacity bound.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    /// Push a record, evicting the oldest when at capacity.
    pub fn push(&mut self, record: ErrorRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: u64) -> ErrorRecord {
        ErrorRecord {
            tick,
            command: "spawn".to_string(),
            player_id: Some(PlayerId(7)),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn ring_keeps_insertion_order() {
        let mut ring = ErrorRing::new();
        ring.push(record(1));
        ring.push(record(2));
        let ticks: Vec<u64> = ring.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![1, 2]);
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let mut ring = ErrorRing::with_capacity(2);
        ring.push(record(1));
        ring.push(record(2));
        ring.push(record(3));
        let ticks: Vec<u64> = ring.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = ErrorEvent {
            match_id: MatchId(1),
            record: record(4),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"matchId\":1"));
        assert!(json.contains("\"playerId\":7"));
    }
}
