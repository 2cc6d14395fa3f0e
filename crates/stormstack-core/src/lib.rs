//! # StormStack Core
//!
//! Core types, errors, and wire formats shared across all StormStack crates.
//!
//! This crate provides:
//! - Strongly-typed `u64` identifiers (`EntityId`, `MatchId`, `NodeId`, ...)
//! - The unified error taxonomy (`StormError`)
//! - Principals and token scopes
//! - Module version arithmetic
//! - Snapshot and delta wire formats (modern and legacy)
//! - Process configuration and exit codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod id;
pub mod principal;
pub mod snapshot;
pub mod version;

pub use config::{ControlConfig, EngineConfig, exit};
pub use error::StormError;
pub use id::{
    ComponentId, ConnectionId, ContainerId, EntityId, IdAllocator, MatchId, NodeId, PlayerId,
    RequestId, TokenId,
};
pub use principal::{Principal, Scope, ScopeSet};
pub use snapshot::{
    AddedEntity, ComponentColumn, DeltaSnapshot, LegacySnapshot, MatchSnapshot, ModuleDelta,
    ModuleSnapshot, ValueChange,
};
pub use version::ModuleVersion;

/// Re-export common result type
pub type Result<T> = std::result::Result<T, StormError>;
