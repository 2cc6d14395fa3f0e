//! # StormStack Modules
//!
//! Module descriptors, command schemas, the `GameModule` trait, and the
//! per-container runtime that resolves dependencies, binds exports, and
//! keeps systems in a stable dependency-topological order.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod descriptor;
pub mod module;
pub mod runtime;

pub use descriptor::{
    CommandArgs, CommandSpec, ComponentSpec, ModuleDependency, ModuleDescriptor, TypeTag,
};
pub use module::{CommandContext, FollowUpCommand, GameModule, System, SystemContext};
pub use runtime::{EnabledModule, ModuleRuntime};
