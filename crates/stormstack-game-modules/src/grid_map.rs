//! Grid-map module: world-visible 2D positions on a bounded grid.
//!
//! Positions are `Read` (world-visible in snapshots). The bounds system
//! clamps every positioned entity into the grid each tick.

use std::sync::Arc;
use stormstack_core::{ModuleVersion, Principal, Result, StormError};
use stormstack_ecs::Permission;
use stormstack_modules::{
    CommandArgs, CommandContext, CommandSpec, ComponentSpec, GameModule, ModuleDependency,
    ModuleDescriptor, System, SystemContext, TypeTag,
};
use tracing::trace;

/// X-coordinate component.
pub const POSITION_X: &str = "POSITION_X";

/// Y-coordinate component.
pub const POSITION_Y: &str = "POSITION_Y";

/// Default grid extent in either axis.
pub const DEFAULT_GRID_SIZE: f32 = 256.0;

/// 2D grid position module.
pub struct GridMapModule {
    descriptor: ModuleDescriptor,
    grid_size: f32,
}

impl GridMapModule {
    /// The module name.
    pub const NAME: &'static str = "grid_map";

    /// Create the module with the default grid size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_grid_size(DEFAULT_GRID_SIZE)
    }

    /// Create the module with an explicit grid extent.
    #[must_use]
    pub fn with_grid_size(grid_size: f32) -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: Self::NAME.to_string(),
                version: ModuleVersion::new(1, 0, 0),
                components: vec![
                    ComponentSpec::new(POSITION_X, Permission::Read),
                    ComponentSpec::new(POSITION_Y, Permission::Read),
                ],
                commands: vec![CommandSpec::new(
                    "setPosition",
                    [
                        ("entityId", TypeTag::Id),
                        ("x", TypeTag::Float),
                        ("y", TypeTag::Float),
                    ],
                )],
                systems: vec!["grid_bounds".to_string()],
                flag_component: "grid_map_flag".to_string(),
                exports: Vec::new(),
                dependencies: vec![ModuleDependency::new(
                    "entity",
                    ModuleVersion::new(1, 0, 0),
                )],
            },
            grid_size,
        }
    }

    fn set_position(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<()> {
        let entity = args
            .entity("entityId")
            .ok_or_else(|| StormError::TypeError {
                field: "entityId".to_string(),
                expected: "Id",
            })?;
        if !ctx.store.contains_entity(entity) {
            return Err(StormError::EntityNotFound(entity));
        }

        let x = args.float("x").unwrap_or(0.0);
        let y = args.float("y").unwrap_or(0.0);
        let registry = ctx.store.registry();
        let x_column = registry
            .id_of(POSITION_X)
            .ok_or_else(|| StormError::ModuleNotFound(Self::NAME.to_string()))?;
        let y_column = registry
            .id_of(POSITION_Y)
            .ok_or_else(|| StormError::ModuleNotFound(Self::NAME.to_string()))?;

        let principal = ctx.principal;
        ctx.store
            .attach_batch(&principal, entity, &[(x_column, x), (y_column, y)])?;
        trace!(%entity, x, y, "position set");
        Ok(())
    }
}

impl Default for GridMapModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModule for GridMapModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn systems(&self) -> Vec<Arc<dyn System>> {
        vec![Arc::new(GridBoundsSystem {
            grid_size: self.grid_size,
        })]
    }

    fn execute(
        &self,
        command: &str,
        args: &CommandArgs,
        ctx: &mut CommandContext<'_>,
    ) -> Result<()> {
        match command {
            "setPosition" => self.set_position(args, ctx),
            other => Err(StormError::UnknownCommand(other.to_string())),
        }
    }
}

/// Clamps positioned entities into the grid each tick.
struct GridBoundsSystem {
    grid_size: f32,
}

impl System for GridBoundsSystem {
    fn name(&self) -> &'static str {
        "grid_bounds"
    }

    fn run(&self, ctx: &mut SystemContext<'_>) -> Result<()> {
        let registry = ctx.store.registry();
        let Some(x_column) = registry.id_of(POSITION_X) else {
            return Ok(());
        };
        let Some(y_column) = registry.id_of(POSITION_Y) else {
            return Ok(());
        };
        let Some(flag) = registry.id_of("grid_map_flag") else {
            return Ok(());
        };

        let positioned = ctx.store.entities_with_components(&[flag, x_column]);
        let principal = Principal::anonymous();
        for entity in positioned.iter() {
            let x = ctx.store.get(*entity, x_column);
            let y = ctx.store.get(*entity, y_column);
            let clamped_x = x.clamp(0.0, self.grid_size);
            let clamped_y = if y.is_nan() { y } else { y.clamp(0.0, self.grid_size) };
            if x != clamped_x {
                ctx.store.attach(&principal, *entity, x_column, clamped_x)?;
            }
            if !y.is_nan() && y != clamped_y {
                ctx.store.attach(&principal, *entity, y_column, clamped_y)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityModule;
    use stormstack_core::{MatchId, PlayerId};
    use stormstack_ecs::ComponentStore;
    use stormstack_modules::ModuleRuntime;

    fn runtime_and_store() -> (ModuleRuntime, ComponentStore) {
        let mut store = ComponentStore::new(64, 16);
        let runtime = ModuleRuntime::new(
            vec![Arc::new(EntityModule::new()), Arc::new(GridMapModule::new())],
            store.registry_mut(),
        )
        .expect("runtime");
        (runtime, store)
    }

    fn execute(
        runtime: &ModuleRuntime,
        store: &mut ComponentStore,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let (owner, spec) = runtime.find_command(command).expect("command");
        let args = spec.coerce(&payload)?;
        let flags = runtime.flags().to_vec();
        let mut ctx = CommandContext::new(
            store,
            MatchId(1),
            PlayerId(7),
            0,
            &flags,
            runtime.superuser(),
        );
        owner.module.execute(command, &args, &mut ctx)
    }

    #[test]
    fn grid_map_depends_on_entity() {
        let mut store = ComponentStore::new(64, 16);
        let result = ModuleRuntime::new(
            vec![Arc::new(GridMapModule::new())],
            store.registry_mut(),
        );
        assert!(matches!(result, Err(StormError::PreconditionFailed(_))));
    }

    #[test]
    fn set_position_stores_coordinates() {
        let (runtime, mut store) = runtime_and_store();
        execute(&runtime, &mut store, "spawn", serde_json::json!({"entityType": 3}))
            .expect("spawn");
        let flag = runtime.resolve(EntityModule::NAME).expect("module").flag;
        let entity = store.entities_with_components(&[flag])[0];

        execute(
            &runtime,
            &mut store,
            "setPosition",
            serde_json::json!({"entityId": entity.0, "x": 4.0, "y": 5.0}),
        )
        .expect("setPosition");

        let x = store.registry().id_of(POSITION_X).expect("column");
        let y = store.registry().id_of(POSITION_Y).expect("column");
        assert_eq!(store.get(entity, x), 4.0);
        assert_eq!(store.get(entity, y), 5.0);
    }

    #[test]
    fn set_position_unknown_entity_fails() {
        let (runtime, mut store) = runtime_and_store();
        let result = execute(
            &runtime,
            &mut store,
            "setPosition",
            serde_json::json!({"entityId": 404, "x": 1.0, "y": 1.0}),
        );
        assert!(matches!(result, Err(StormError::EntityNotFound(_))));
    }

    #[test]
    fn bounds_system_clamps_positions() {
        let (runtime, mut store) = runtime_and_store();
        execute(&runtime, &mut store, "spawn", serde_json::json!({"entityType": 1}))
            .expect("spawn");
        let entity_flag = runtime.resolve(EntityModule::NAME).expect("module").flag;
        let entity = store.entities_with_components(&[entity_flag])[0];

        execute(
            &runtime,
            &mut store,
            "setPosition",
            serde_json::json!({"entityId": entity.0, "x": 9999.0, "y": -3.0}),
        )
        .expect("setPosition");

        let grid = runtime.resolve(GridMapModule::NAME).expect("module");
        let system = &grid.systems[0];
        let mut follow_ups = Vec::new();
        let mut ctx = SystemContext::new(&mut store, MatchId(1), 1, &mut follow_ups);
        system.run(&mut ctx).expect("system");

        let x = store.registry().id_of(POSITION_X).expect("column");
        let y = store.registry().id_of(POSITION_Y).expect("column");
        assert_eq!(store.get(entity, x), DEFAULT_GRID_SIZE);
        assert_eq!(store.get(entity, y), 0.0);
    }
}
