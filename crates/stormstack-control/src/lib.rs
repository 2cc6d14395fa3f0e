//! # StormStack Control
//!
//! The control-plane daemon (port 8081 by convention): node registry,
//! match routing, player admission, and the heartbeat sweeper.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod routes;
pub mod state;
pub mod sweeper;

pub use routes::create_router;
pub use state::{ControlState, SharedControlState};
