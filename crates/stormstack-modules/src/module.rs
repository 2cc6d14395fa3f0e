//! The `GameModule` trait and execution contexts.
//!
//! Modules contribute components, commands, and systems. Commands and
//! systems run on the tick thread with exclusive store access; systems
//! may enqueue follow-up commands, which execute on the next tick, and
//! must never block on I/O.

use crate::descriptor::{CommandArgs, ModuleDescriptor};
use std::sync::Arc;
use stormstack_core::{ComponentId, EntityId, MatchId, PlayerId, Principal, Result};
use stormstack_ecs::ComponentStore;

/// A command enqueued by a system during a tick, executed next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpCommand {
    /// Command name.
    pub command: String,
    /// Raw payload, coerced against the schema at drain time.
    pub payload: serde_json::Value,
}

/// Context for command execution.
pub struct CommandContext<'a> {
    /// Exclusive store access for the duration of the command.
    pub store: &'a mut ComponentStore,
    /// The match the command targets.
    pub match_id: MatchId,
    /// The player who issued the command.
    pub player_id: PlayerId,
    /// Tick at which the command executes.
    pub tick: u64,
    /// Principal of the issuing player.
    pub principal: Principal,
    enabled_flags: &'a [ComponentId],
    superuser: Principal,
}

impl<'a> CommandContext<'a> {
    /// Create a command context. `enabled_flags` are the flag columns of
    /// every module enabled on the container.
    #[must_use]
    pub fn new(
        store: &'a mut ComponentStore,
        match_id: MatchId,
        player_id: PlayerId,
        tick: u64,
        enabled_flags: &'a [ComponentId],
        superuser: Principal,
    ) -> Self {
        Self {
            store,
            match_id,
            player_id,
            tick,
            principal: Principal::player(player_id),
            enabled_flags,
            superuser,
        }
    }

    /// The built-in spawn path: reserve an id, attach `MATCH_ID` and
    /// `ENTITY_ID`, then the flag component of every enabled module under
    /// the in-process superuser principal. The issuing module attaches
    /// its own components afterwards.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExhausted` when entity slots are full.
    pub fn spawn(&mut self) -> Result<EntityId> {
        let entity = self.store.create_entity_for_match(self.match_id)?;
        let flags: Vec<(ComponentId, f32)> =
            self.enabled_flags.iter().map(|flag| (*flag, 1.0)).collect();
        self.store.attach_batch(&self.superuser, entity, &flags)?;
        Ok(entity)
    }

    /// Remove an entity by clearing every module flag and deleting the slot.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown slot.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        for flag in self.enabled_flags {
            self.store.remove(&self.superuser, entity, *flag)?;
        }
        self.store.delete_entity(entity)
    }
}

/// Context for system execution.
pub struct SystemContext<'a> {
    /// Exclusive store access for the duration of the system pass.
    pub store: &'a mut ComponentStore,
    /// The match being ticked.
    pub match_id: MatchId,
    /// Current tick.
    pub tick: u64,
    follow_ups: &'a mut Vec<FollowUpCommand>,
}

impl<'a> SystemContext<'a> {
    /// Create a system context.
    #[must_use]
    pub fn new(
        store: &'a mut ComponentStore,
        match_id: MatchId,
        tick: u64,
        follow_ups: &'a mut Vec<FollowUpCommand>,
    ) -> Self {
        Self {
            store,
            match_id,
            tick,
            follow_ups,
        }
    }

    /// Enqueue a follow-up command. It is NOT executed this tick.
    pub fn enqueue(&mut self, command: impl Into<String>, payload: serde_json::Value) {
        self.follow_ups.push(FollowUpCommand {
            command: command.into(),
            payload,
        });
    }
}

/// A per-tick system contributed by a module.
///
/// Systems see the post-drain store state and must not perform blocking
/// I/O on the tick thread; external work is offloaded and consumed via
/// commands on a future tick.
pub trait System: Send + Sync {
    /// System name for logging and failure accounting.
    fn name(&self) -> &'static str;

    /// Run the system for one match at one tick.
    ///
    /// # Errors
    ///
    /// A failing system is logged and skipped; two consecutive failures
    /// of the same system on the same match transition the match to Error.
    fn run(&self, ctx: &mut SystemContext<'_>) -> Result<()>;
}

/// A self-describing unit contributing components, commands, and systems.
pub trait GameModule: Send + Sync {
    /// The module's registry surface.
    fn descriptor(&self) -> &ModuleDescriptor;

    /// The module's systems, in declared run order.
    fn systems(&self) -> Vec<Arc<dyn System>>;

    /// Execute one of the module's commands.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCommand` when the name is not handled here, or any
    /// store error the command surfaces.
    fn execute(&self, command: &str, args: &CommandArgs, ctx: &mut CommandContext<'_>)
        -> Result<()>;
}
