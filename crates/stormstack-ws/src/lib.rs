//! # StormStack WS
//!
//! Streaming fanout for snapshot and command channels. Snapshot-out is
//! at-most-once with last-value-wins coalescing (a `watch` channel per
//! match); command-in feeds the engine's queues directly. Delta
//! subscribers that miss ticks receive a full resync snapshot and then
//! resume deltas.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod fanout;
pub mod messages;
pub mod outbound;
pub mod subscriber;

pub use fanout::{shared_fanout, FanoutHub, SharedFanoutHub};
pub use messages::{ClientMessage, ServerMessage};
pub use outbound::Outbound;
pub use subscriber::{SnapshotSubscriber, SubscriptionMode};
