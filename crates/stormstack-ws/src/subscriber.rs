//! Per-subscriber frame rendering.
//!
//! A full subscriber gets every observed frame as a full snapshot. A
//! delta subscriber gets deltas as long as each frame's `from_tick`
//! chains onto the last tick it saw; any gap (coalesced frames, engine
//! resync, first frame) produces a full snapshot flagged `resync`, after
//! which deltas resume.

use crate::messages::ServerMessage;
use stormstack_engine::SnapshotFrame;

/// What a snapshot-stream subscriber asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Full snapshot every tick.
    Full,
    /// Deltas, with resync on gaps.
    Delta,
}

/// Tracks one subscriber's stream position.
#[derive(Debug)]
pub struct SnapshotSubscriber {
    mode: SubscriptionMode,
    last_tick: Option<u64>,
}

impl SnapshotSubscriber {
    /// New subscriber in the given mode.
    #[must_use]
    pub const fn new(mode: SubscriptionMode) -> Self {
        Self {
            mode,
            last_tick: None,
        }
    }

    /// Render the message this subscriber should receive for a frame.
    pub fn render(&mut self, frame: &SnapshotFrame) -> ServerMessage {
        let message = match self.mode {
            SubscriptionMode::Full => ServerMessage::Snapshot {
                resync: false,
                snapshot: (*frame.snapshot).clone(),
            },
            SubscriptionMode::Delta => match (&frame.delta, self.last_tick) {
                (Some(delta), Some(last)) if delta.from_tick == last && !frame.resync => {
                    ServerMessage::Delta {
                        delta: (**delta).clone(),
                    }
                }
                _ => ServerMessage::Snapshot {
                    resync: true,
                    snapshot: (*frame.snapshot).clone(),
                },
            },
        };
        self.last_tick = Some(frame.tick);
        message
    }
}
