//! Entity module: entity lifecycle with type and ownership tracking.
//!
//! Provides the `spawn` and `remove` commands. Spawning runs the built-in
//! entity-creation hook (built-ins plus every enabled module's flag, under
//! the in-process superuser), then attaches this module's own components:
//! `ENTITY_TYPE` and `OWNER_ID`. The module exports the built-in
//! `ENTITY_ID` column so consumers can correlate snapshot rows.

use std::sync::Arc;
use stormstack_core::{ModuleVersion, Result, StormError};
use stormstack_ecs::Permission;
use stormstack_modules::{
    CommandArgs, CommandContext, CommandSpec, ComponentSpec, GameModule, ModuleDescriptor, System,
    TypeTag,
};
use tracing::debug;

/// Component holding the caller-declared entity type.
pub const ENTITY_TYPE: &str = "ENTITY_TYPE";

/// Component holding the spawning player's id.
pub const OWNER_ID: &str = "OWNER_ID";

/// Entity lifecycle module.
pub struct EntityModule {
    descriptor: ModuleDescriptor,
}

impl EntityModule {
    /// The module name.
    pub const NAME: &'static str = "entity";

    /// Create the module.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: Self::NAME.to_string(),
                version: ModuleVersion::new(1, 0, 0),
                components: vec![
                    ComponentSpec::new(ENTITY_TYPE, Permission::Write),
                    ComponentSpec::new(OWNER_ID, Permission::Write),
                ],
                commands: vec![
                    CommandSpec::new("spawn", [("entityType", TypeTag::Int)]),
                    CommandSpec::new("remove", [("entityId", TypeTag::Id)]),
                ],
                systems: Vec::new(),
                flag_component: "entity_flag".to_string(),
                exports: vec!["ENTITY_ID".to_string()],
                dependencies: Vec::new(),
            },
        }
    }

    fn spawn(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<()> {
        let entity_type = args.int("entityType").unwrap_or(0);
        let entity = ctx.spawn()?;

        let registry = ctx.store.registry();
        let type_column = registry
            .id_of(ENTITY_TYPE)
            .ok_or_else(|| StormError::ModuleNotFound(Self::NAME.to_string()))?;
        let owner_column = registry
            .id_of(OWNER_ID)
            .ok_or_else(|| StormError::ModuleNotFound(Self::NAME.to_string()))?;

        let principal = ctx.principal;
        let player = ctx.player_id;
        ctx.store.attach_batch(
            &principal,
            entity,
            &[
                (type_column, entity_type as f32),
                (owner_column, player.0 as f32),
            ],
        )?;

        debug!(%entity, entity_type, player = %player, "spawned entity");
        Ok(())
    }

    fn remove(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<()> {
        let entity = args
            .entity("entityId")
            .ok_or_else(|| StormError::TypeError {
                field: "entityId".to_string(),
                expected: "Id",
            })?;
        ctx.despawn(entity)
    }
}

impl Default for EntityModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModule for EntityModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn systems(&self) -> Vec<Arc<dyn System>> {
        Vec::new()
    }

    fn execute(
        &self,
        command: &str,
        args: &CommandArgs,
        ctx: &mut CommandContext<'_>,
    ) -> Result<()> {
        match command {
            "spawn" => self.spawn(args, ctx),
            "remove" => self.remove(args, ctx),
            other => Err(StormError::UnknownCommand(other.to_string())),
        }
    }
}
