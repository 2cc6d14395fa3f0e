//! # StormStack Engine
//!
//! The per-node execution engine: bounded command queues, the tick
//! scheduler pipeline, the snapshot engine with retained priors, and the
//! node-local match/container registry.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod container;
pub mod events;
pub mod matches;
pub mod queue;
pub mod scheduler;
pub mod snapshot;

pub use container::{
    shared_container_service, Container, ContainerService, ContainerStatus, MatchInfo,
    ModuleCatalog, SharedContainerService,
};
pub use events::{ErrorEvent, ErrorRecord, ErrorRing};
pub use matches::{MatchRecord, MatchStatus};
pub use queue::{CommandEnvelope, CommandQueue};
pub use scheduler::{NullSink, SchedulerHandle, SnapshotSink, TickScheduler};
pub use snapshot::{SnapshotEngine, SnapshotFrame, OWNER_ID, PLAYER_ID};
