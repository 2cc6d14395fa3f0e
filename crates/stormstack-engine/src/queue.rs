//! Bounded per-match command queues.
//!
//! Commands are validated and coerced at submission, then buffered in a
//! per-match FIFO. A full queue rejects with `Backpressure`; submitters
//! should retry with jittered backoff. Drain order is FIFO per match;
//! ordering across matches is independent.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use stormstack_core::{ContainerId, MatchId, PlayerId, Result, StormError};
use stormstack_modules::CommandArgs;
use tracing::trace;

/// A validated, typed command awaiting its tick.
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    /// Target container.
    pub container_id: ContainerId,
    /// Target match.
    pub match_id: MatchId,
    /// Issuing player.
    pub player_id: PlayerId,
    /// Command name, resolved against the container's module runtime.
    pub command: String,
    /// Coerced arguments.
    pub args: CommandArgs,
    /// Wall-clock submission time.
    pub authored_at: DateTime<Utc>,
}

/// Per-container command queue with bounded per-match FIFOs.
pub struct CommandQueue {
    capacity: usize,
    queues: Mutex<HashMap<MatchId, VecDeque<CommandEnvelope>>>,
}

impl CommandQueue {
    /// Create a queue with the given per-match capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Append an envelope to its match's FIFO.
    ///
    /// # Errors
    ///
    /// Returns `Backpressure` when the match FIFO is full.
    pub fn submit(&self, envelope: CommandEnvelope) -> Result<()> {
        let mut queues = self.queues.lock();
        let queue = queues.entry(envelope.match_id).or_default();
        if queue.len() >= self.capacity {
            return Err(StormError::Backpressure(envelope.match_id));
        }
        trace!(
            command = %envelope.command,
            match_id = %envelope.match_id,
            depth = queue.len() + 1,
            "queued command"
        );
        queue.push_back(envelope);
        Ok(())
    }

    /// Pop up to `max` envelopes for a match in submission order.
    #[must_use]
    pub fn drain(&self, match_id: MatchId, max: usize) -> Vec<CommandEnvelope> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(&match_id) else {
            return Vec::new();
        };
        let take = queue.len().min(max);
        queue.drain(..take).collect()
    }

    /// Pending command count for a match.
    #[must_use]
    pub fn len(&self, match_id: MatchId) -> usize {
        self.queues
            .lock()
            .get(&match_id)
            .map_or(0, VecDeque::len)
    }

    /// Whether a match has no pending commands.
    #[must_use]
    pub fn is_empty(&self, match_id: MatchId) -> bool {
        self.len(match_id) == 0
    }

    /// Fill fraction of the fullest match FIFO, in [0, 1]. At ≥ 0.9 the
    /// container reports elevated saturation to the control plane.
    #[must_use]
    pub fn saturation(&self) -> f64 {
        let queues = self.queues.lock();
        let fullest = queues.values().map(VecDeque::len).max().unwrap_or(0);
        fullest as f64 / self.capacity as f64
    }

    /// Drop a match's FIFO entirely (match reached a terminal state).
    pub fn remove_match(&self, match_id: MatchId) {
        self.queues.lock().remove(&match_id);
    }

    /// Drop every FIFO (container stopped).
    pub fn clear(&self) {
        self.queues.lock().clear();
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("capacity", &self.capacity)
            .field("matches", &self.queues.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(match_id: MatchId, command: &str) -> CommandEnvelope {
        CommandEnvelope {
            container_id: ContainerId(1),
            match_id,
            player_id: PlayerId(7),
            command: command.to_string(),
            args: CommandArgs::default(),
            authored_at: Utc::now(),
        }
    }

    #[test]
    fn drains_in_submission_order() {
        let queue = CommandQueue::new(16);
        queue.submit(envelope(MatchId(1), "first")).expect("submit");
        queue.submit(envelope(MatchId(1), "second")).expect("submit");
        queue.submit(envelope(MatchId(1), "third")).expect("submit");

        let drained = queue.drain(MatchId(1), 2);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].command, "first");
        assert_eq!(drained[1].command, "second");
        assert_eq!(queue.len(MatchId(1)), 1);
    }

    #[test]
    fn matches_are_independent() {
        let queue = CommandQueue::new(16);
        queue.submit(envelope(MatchId(1), "a")).expect("submit");
        queue.submit(envelope(MatchId(2), "b")).expect("submit");

        assert_eq!(queue.drain(MatchId(1), 10).len(), 1);
        assert_eq!(queue.len(MatchId(2)), 1);
    }

    #[test]
    fn full_queue_backpressures() {
        let queue = CommandQueue::new(2);
        queue.submit(envelope(MatchId(1), "a")).expect("submit");
        queue.submit(envelope(MatchId(1), "b")).expect("submit");

        let result = queue.submit(envelope(MatchId(1), "c"));
        assert!(matches!(result, Err(StormError::Backpressure(m)) if m == MatchId(1)));

        // Another match is unaffected.
        queue.submit(envelope(MatchId(2), "d")).expect("submit");
    }

    #[test]
    fn saturation_tracks_fullest_match() {
        let queue = CommandQueue::new(10);
        assert_eq!(queue.saturation(), 0.0);

        for _ in 0..9 {
            queue.submit(envelope(MatchId(1), "x")).expect("submit");
        }
        queue.submit(envelope(MatchId(2), "y")).expect("submit");
        assert!(queue.saturation() >= 0.9);

        queue.remove_match(MatchId(1));
        assert!(queue.saturation() < 0.9);
    }

    #[test]
    fn drain_unknown_match_is_empty() {
        let queue = CommandQueue::new(4);
        assert!(queue.drain(MatchId(99), 10).is_empty());
        assert!(queue.is_empty(MatchId(99)));
    }
}
