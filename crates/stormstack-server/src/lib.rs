//! # StormStack Server
//!
//! The engine-node daemon. Hosts containers behind the node HTTP surface
//! (port 8080 by convention), streams snapshots and accepts command
//! streams over WebSocket, and heartbeats to the control plane.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod heartbeat;
pub mod routes;
pub mod state;
pub mod ws;

pub use routes::create_router;
pub use state::{AppState, SharedAppState};
