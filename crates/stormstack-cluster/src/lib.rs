//! # StormStack Cluster
//!
//! The control plane's view of the cluster: the node registry with
//! heartbeat/saturation accounting and the match router that places
//! matches on nodes and admits players.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod registry;
pub mod router;

pub use registry::{NodeHeartbeat, NodeMetrics, NodeRegistry, NodeStatus, NodeSummary};
pub use router::{
    HttpNodeControl, JoinOutcome, MatchRouter, NodeControl, PlacementRequest, RoutedMatch,
};
