//! # StormStack Test Utils
//!
//! Shared harness and fixtures: a container prewired with the built-in
//! modules and a running match, plus token fixtures for gate tests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod fixtures;
pub mod harness;

pub use fixtures::{issuer_and_gate, player_token, TEST_SECRET};
pub use harness::EngineHarness;
