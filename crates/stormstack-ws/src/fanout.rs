//! Per-match snapshot-out channels.
//!
//! One `watch` channel per match gives every subscriber last-value-wins
//! coalescing for free: a slow subscriber observes only the latest frame,
//! and the latest frame is always eventually delivered.

use dashmap::DashMap;
use std::sync::Arc;
use stormstack_core::MatchId;
use stormstack_engine::{SnapshotFrame, SnapshotSink};
use tokio::sync::watch;
use tracing::trace;

type FrameSlot = Option<Arc<SnapshotFrame>>;

/// Snapshot fanout hub, shared between schedulers and ws handlers.
#[derive(Debug, Default)]
pub struct FanoutHub {
    matches: DashMap<MatchId, watch::Sender<FrameSlot>>,
}

impl FanoutHub {
    /// Empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a match's frames. The receiver immediately observes
    /// the latest frame, if one was published.
    #[must_use]
    pub fn subscribe(&self, match_id: MatchId) -> watch::Receiver<FrameSlot> {
        self.matches
            .entry(match_id)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Stop fanning out a match (terminal state reached).
    pub fn drop_match(&self, match_id: MatchId) {
        self.matches.remove(&match_id);
    }

    /// Number of matches with a live channel.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Subscribers currently attached to a match.
    #[must_use]
    pub fn subscriber_count(&self, match_id: MatchId) -> usize {
        self.matches
            .get(&match_id)
            .map_or(0, |sender| sender.receiver_count())
    }
}

impl SnapshotSink for FanoutHub {
    fn publish(&self, frame: SnapshotFrame) {
        trace!(match_id = %frame.match_id, tick = frame.tick, "fanning out frame");
        let sender = self
            .matches
            .entry(frame.match_id)
            .or_insert_with(|| watch::channel(None).0);
        sender.send_replace(Some(Arc::new(frame)));
    }
}

/// Shared fanout hub handle.
pub type SharedFanoutHub = Arc<FanoutHub>;

/// Create a shared fanout hub.
#[must_use]
pub fn shared_fanout() -> SharedFanoutHub {
    Arc::new(FanoutHub::new())
}
