//! Snapshot engine: full and delta snapshots with retained priors.
//!
//! Construction runs on the tick thread after systems; no store mutation
//! happens during a build, and the outputs are immutable and shared among
//! fanout clients. Entity order is ascending id, stable across ticks,
//! which keeps delta indices meaningful.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use stormstack_core::{
    AddedEntity, ComponentColumn, DeltaSnapshot, EntityId, MatchId, MatchSnapshot, ModuleDelta,
    ModuleSnapshot, PlayerId, Result, StormError, ValueChange,
};
use stormstack_ecs::{ComponentStore, Permission};
use stormstack_modules::ModuleRuntime;
use tracing::debug;

/// Component naming an entity's owning player (set by the entity module).
pub const OWNER_ID: &str = "OWNER_ID";

/// Alternative player-linkage component honored by the scoping filter.
pub const PLAYER_ID: &str = "PLAYER_ID";

/// One tick's published snapshot output for a match.
#[derive(Debug, Clone)]
pub struct SnapshotFrame {
    /// The match.
    pub match_id: MatchId,
    /// The tick the frame was produced at.
    pub tick: u64,
    /// The full snapshot.
    pub snapshot: Arc<MatchSnapshot>,
    /// The delta against the prior frame, when one was retained.
    pub delta: Option<Arc<DeltaSnapshot>>,
    /// True when no prior was retained and consumers must resync.
    pub resync: bool,
}

/// Builds full and delta snapshots, retaining the prior per match.
#[derive(Debug, Default)]
pub struct SnapshotEngine {
    priors: HashMap<MatchId, Arc<MatchSnapshot>>,
}

impl SnapshotEngine {
    /// Create an engine with no retained priors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a full snapshot, optionally scoped to a player.
    ///
    /// Scoping is decided per module: a module whose emitted columns are
    /// all world-visible (`Read`) emits every flagged entity; any other
    /// module emits only entities whose `OWNER_ID` or `PLAYER_ID` equals
    /// the consumer. Private components are never emitted.
    #[must_use]
    pub fn build_full(
        store: &ComponentStore,
        runtime: &ModuleRuntime,
        match_id: MatchId,
        tick: u64,
        player: Option<PlayerId>,
    ) -> MatchSnapshot {
        let registry = store.registry();
        let mut snapshot = MatchSnapshot::new(match_id, tick);

        for module in runtime.modules() {
            let descriptor = module.module.descriptor();

            // Emitted columns: the module's non-Private components plus
            // any export that resolves to a registered, non-Private column.
            let mut names: BTreeSet<String> = descriptor
                .components
                .iter()
                .filter(|c| c.permission != Permission::Private)
                .map(|c| c.name.clone())
                .collect();
            for export in &descriptor.exports {
                if let Some(id) = registry.id_of(export) {
                    if registry.permission(id) != Permission::Private {
                        names.insert(export.clone());
                    }
                }
            }

            let columns: Vec<(String, stormstack_core::ComponentId)> = names
                .into_iter()
                .filter_map(|name| registry.id_of(&name).map(|id| (name, id)))
                .collect();

            let mut entities: Vec<EntityId> =
                store.entities_with_components(&[module.flag]).to_vec();

            if let Some(player) = player {
                let world_visible = !columns.is_empty()
                    && columns
                        .iter()
                        .all(|(_, id)| registry.permission(*id) == Permission::Read);
                if !world_visible {
                    let owner = registry.id_of(OWNER_ID);
                    let linked = registry.id_of(PLAYER_ID);
                    let wanted = player.0 as f32;
                    entities.retain(|entity| {
                        owner.is_some_and(|c| store.get(*entity, c) == wanted)
                            || linked.is_some_and(|c| store.get(*entity, c) == wanted)
                    });
                }
            }

            let components = columns
                .into_iter()
                .map(|(name, id)| ComponentColumn {
                    values: entities.iter().map(|e| store.get(*e, id)).collect(),
                    name,
                })
                .collect();

            snapshot.modules.push(ModuleSnapshot {
                name: descriptor.name.clone(),
                version: descriptor.version,
                entities,
                components,
            });
        }

        snapshot
    }

    /// Build this tick's frame for a match: the full snapshot plus, when a
    /// prior is retained, the delta against it. The new snapshot becomes
    /// the retained prior.
    pub fn capture(
        &mut self,
        store: &ComponentStore,
        runtime: &ModuleRuntime,
        match_id: MatchId,
        tick: u64,
    ) -> SnapshotFrame {
        let snapshot = Arc::new(Self::build_full(store, runtime, match_id, tick, None));
        let prior = self.priors.insert(match_id, Arc::clone(&snapshot));

        let delta = prior
            .as_ref()
            .map(|prior| Arc::new(Self::compute_delta(prior, &snapshot)));
        let resync = delta.is_none();
        if resync {
            debug!(%match_id, tick, "no retained prior, emitting resync full");
        }

        SnapshotFrame {
            match_id,
            tick,
            snapshot,
            delta,
            resync,
        }
    }

    /// The retained prior for a match, if any.
    #[must_use]
    pub fn prior(&self, match_id: MatchId) -> Option<&Arc<MatchSnapshot>> {
        self.priors.get(&match_id)
    }

    /// Forget a match (terminal state reached).
    pub fn drop_match(&mut self, match_id: MatchId) {
        self.priors.remove(&match_id);
    }

    /// Compute the change set between two consecutive snapshots of one
    /// match. `changed` indices address `prior`'s entity order; a
    /// component newly attached to a surviving entity surfaces in
    /// `changed` as a transition from absent to its value.
    #[must_use]
    pub fn compute_delta(prior: &MatchSnapshot, new: &MatchSnapshot) -> DeltaSnapshot {
        let mut delta = DeltaSnapshot::new(new.match_id, prior.tick, new.tick);

        for new_module in &new.modules {
            let mut module_delta = ModuleDelta::new(new_module.name.clone());
            let prior_module = prior.module(&new_module.name);

            let prior_entities: &[EntityId] =
                prior_module.map_or(&[], |m| m.entities.as_slice());
            let prior_index: HashMap<EntityId, usize> = prior_entities
                .iter()
                .enumerate()
                .map(|(i, e)| (*e, i))
                .collect();
            let new_set: HashSet<EntityId> = new_module.entities.iter().copied().collect();

            for entity in prior_entities {
                if !new_set.contains(entity) {
                    module_delta.removed.push(*entity);
                }
            }

            for (new_idx, entity) in new_module.entities.iter().enumerate() {
                if let Some(&old_idx) = prior_index.get(entity) {
                    let column_names: BTreeSet<&String> = new_module
                        .components
                        .iter()
                        .map(|c| &c.name)
                        .chain(prior_module.iter().flat_map(|m| {
                            m.components.iter().map(|c| &c.name)
                        }))
                        .collect();
                    for name in column_names {
                        let old = prior_module
                            .and_then(|m| m.column(name))
                            .and_then(|c| c.values.get(old_idx))
                            .copied()
                            .unwrap_or(f32::NAN);
                        let current = new_module
                            .column(name)
                            .and_then(|c| c.values.get(new_idx))
                            .copied()
                            .unwrap_or(f32::NAN);
                        if !float_eq(old, current) {
                            module_delta.changed.push(ValueChange {
                                index: old_idx,
                                component: name.clone(),
                                value: current,
                            });
                        }
                    }
                } else {
                    let values: BTreeMap<String, f32> = new_module
                        .components
                        .iter()
                        .filter_map(|column| {
                            column.values.get(new_idx).and_then(|v| {
                                (!v.is_nan()).then(|| (column.name.clone(), *v))
                            })
                        })
                        .collect();
                    module_delta.added.push(AddedEntity {
                        entity: *entity,
                        values,
                    });
                }
            }

            if !module_delta.is_empty() {
                delta.modules.push(module_delta);
            }
        }

        delta
    }

    /// Reconstruct the next snapshot from a prior and the delta between
    /// them: `apply(prior, compute_delta(prior, new)) == new`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when the delta references a module the prior
    /// does not carry.
    pub fn apply_delta(prior: &MatchSnapshot, delta: &DeltaSnapshot) -> Result<MatchSnapshot> {
        let mut result = prior.clone();
        result.tick = delta.to_tick;

        for module_delta in &delta.modules {
            let module = result
                .modules
                .iter_mut()
                .find(|m| m.name == module_delta.name)
                .ok_or_else(|| {
                    StormError::InvalidState(format!(
                        "delta references unknown module '{}'",
                        module_delta.name
                    ))
                })?;

            // Changed values address the prior entity order; apply them
            // before any structural edits.
            for change in &module_delta.changed {
                let position = match module
                    .components
                    .iter()
                    .position(|c| c.name == change.component)
                {
                    Some(position) => position,
                    None => {
                        module.components.push(ComponentColumn {
                            name: change.component.clone(),
                            values: vec![f32::NAN; module.entities.len()],
                        });
                        module.components.len() - 1
                    }
                };
                if let Some(slot) = module.components[position].values.get_mut(change.index) {
                    *slot = change.value;
                }
            }

            let removed: HashSet<EntityId> = module_delta.removed.iter().copied().collect();
            if !removed.is_empty() {
                let keep: Vec<bool> = module
                    .entities
                    .iter()
                    .map(|e| !removed.contains(e))
                    .collect();
                module.entities.retain(|e| !removed.contains(e));
                for column in &mut module.components {
                    let mut index = 0;
                    column.values.retain(|_| {
                        let kept = keep[index];
                        index += 1;
                        kept
                    });
                }
            }

            for added in &module_delta.added {
                let position = module
                    .entities
                    .partition_point(|e| *e < added.entity);
                module.entities.insert(position, added.entity);
                for column in &mut module.components {
                    let value = added.values.get(&column.name).copied().unwrap_or(f32::NAN);
                    column.values.insert(position, value);
                }
            }

            module.components.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(result)
    }
}

fn float_eq(a: f32, b: f32) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormstack_core::{ModuleVersion, Principal};

    fn module_snapshot(
        name: &str,
        entities: Vec<u64>,
        columns: Vec<(&str, Vec<f32>)>,
    ) -> ModuleSnapshot {
        ModuleSnapshot {
            name: name.to_string(),
            version: ModuleVersion::new(1, 0, 0),
            entities: entities.into_iter().map(EntityId).collect(),
            components: columns
                .into_iter()
                .map(|(name, values)| ComponentColumn {
                    name: name.to_string(),
                    values,
                })
                .collect(),
        }
    }

    fn snapshot(tick: u64, modules: Vec<ModuleSnapshot>) -> MatchSnapshot {
        MatchSnapshot {
            match_id: MatchId(1),
            tick,
            modules,
        }
    }

    #[test]
    fn delta_detects_value_changes_at_prior_indices() {
        let prior = snapshot(
            1,
            vec![module_snapshot("grid", vec![10, 11], vec![("X", vec![1.0, 2.0])])],
        );
        let new = snapshot(
            2,
            vec![module_snapshot("grid", vec![10, 11], vec![("X", vec![1.0, 5.0])])],
        );

        let delta = SnapshotEngine::compute_delta(&prior, &new);
        assert_eq!(delta.from_tick, 1);
        assert_eq!(delta.to_tick, 2);
        assert_eq!(delta.modules.len(), 1);
        assert_eq!(
            delta.modules[0].changed,
            vec![ValueChange {
                index: 1,
                component: "X".to_string(),
                value: 5.0
            }]
        );
    }

    #[test]
    fn delta_tracks_added_and_removed_entities() {
        let prior = snapshot(
            1,
            vec![module_snapshot("grid", vec![10, 11], vec![("X", vec![1.0, 2.0])])],
        );
        let new = snapshot(
            2,
            vec![module_snapshot("grid", vec![11, 12], vec![("X", vec![2.0, 9.0])])],
        );

        let delta = SnapshotEngine::compute_delta(&prior, &new);
        let module = &delta.modules[0];
        assert_eq!(module.removed, vec![EntityId(10)]);
        assert_eq!(module.added.len(), 1);
        assert_eq!(module.added[0].entity, EntityId(12));
        assert_eq!(module.added[0].values.get("X"), Some(&9.0));
    }

    #[test]
    fn component_attached_mid_stream_lands_in_changed() {
        let prior = snapshot(
            1,
            vec![module_snapshot("grid", vec![10], vec![("X", vec![f32::NAN])])],
        );
        let new = snapshot(
            2,
            vec![module_snapshot("grid", vec![10], vec![("X", vec![3.0])])],
        );

        let delta = SnapshotEngine::compute_delta(&prior, &new);
        assert_eq!(delta.modules[0].added.len(), 0);
        assert_eq!(
            delta.modules[0].changed,
            vec![ValueChange {
                index: 0,
                component: "X".to_string(),
                value: 3.0
            }]
        );
    }

    #[test]
    fn unchanged_snapshot_yields_empty_delta() {
        let prior = snapshot(
            1,
            vec![module_snapshot("grid", vec![10], vec![("X", vec![1.0])])],
        );
        let mut new = prior.clone();
        new.tick = 2;

        let delta = SnapshotEngine::compute_delta(&prior, &new);
        assert!(delta.is_empty());
    }

    #[test]
    fn apply_roundtrips_value_and_membership_changes() {
        let prior = snapshot(
            1,
            vec![module_snapshot(
                "grid",
                vec![10, 11, 12],
                vec![("X", vec![1.0, 2.0, 3.0]), ("Y", vec![0.0, 0.0, 0.0])],
            )],
        );
        let new = snapshot(
            2,
            vec![module_snapshot(
                "grid",
                vec![10, 12, 14],
                vec![("X", vec![1.5, 3.0, 7.0]), ("Y", vec![0.0, -1.0, 0.5])],
            )],
        );

        let delta = SnapshotEngine::compute_delta(&prior, &new);
        let applied = SnapshotEngine::apply_delta(&prior, &delta).expect("apply");
        assert_eq!(applied, new);
    }

    #[test]
    fn apply_rejects_unknown_module() {
        let prior = snapshot(1, vec![]);
        let mut delta = DeltaSnapshot::new(MatchId(1), 1, 2);
        delta.modules.push(ModuleDelta::new("ghost".to_string()));
        assert!(matches!(
            SnapshotEngine::apply_delta(&prior, &delta),
            Err(StormError::InvalidState(_))
        ));
    }

    #[test]
    fn capture_flags_resync_without_prior() {
        let mut store = ComponentStore::new(64, 16);
        let runtime =
            ModuleRuntime::new(Vec::new(), store.registry_mut()).expect("runtime");
        let mut engine = SnapshotEngine::new();

        let first = engine.capture(&store, &runtime, MatchId(1), 1);
        assert!(first.resync);
        assert!(first.delta.is_none());

        let second = engine.capture(&store, &runtime, MatchId(1), 2);
        assert!(!second.resync);
        let delta = second.delta.expect("delta");
        assert_eq!(delta.from_tick, 1);
        assert_eq!(delta.to_tick, 2);
    }

    #[test]
    fn build_full_scopes_by_owner() {
        let mut store = ComponentStore::new(64, 16);
        let su = Principal::superuser();

        struct Scoped;
        impl stormstack_modules::GameModule for Scoped {
            fn descriptor(&self) -> &stormstack_modules::ModuleDescriptor {
                static DESC: std::sync::OnceLock<stormstack_modules::ModuleDescriptor> =
                    std::sync::OnceLock::new();
                DESC.get_or_init(|| stormstack_modules::ModuleDescriptor {
                    name: "inventory".to_string(),
                    version: ModuleVersion::new(1, 0, 0),
                    components: vec![
                        stormstack_modules::ComponentSpec::new("GOLD", Permission::Write),
                        stormstack_modules::ComponentSpec::new(OWNER_ID, Permission::Write),
                    ],
                    commands: vec![],
                    systems: vec![],
                    flag_component: "inventory_flag".to_string(),
                    exports: vec![],
                    dependencies: vec![],
                })
            }
            fn systems(&self) -> Vec<Arc<dyn stormstack_modules::System>> {
                Vec::new()
            }
            fn execute(
                &self,
                command: &str,
                _args: &stormstack_modules::CommandArgs,
                _ctx: &mut stormstack_modules::CommandContext<'_>,
            ) -> Result<()> {
                Err(StormError::UnknownCommand(command.to_string()))
            }
        }

        let runtime = ModuleRuntime::new(vec![Arc::new(Scoped)], store.registry_mut())
            .expect("runtime");
        let flag = runtime.resolve("inventory").expect("module").flag;
        let gold = store.registry().id_of("GOLD").expect("gold");
        let owner = store.registry().id_of(OWNER_ID).expect("owner");

        let mine = store.create_entity_for_match(MatchId(1)).expect("create");
        store
            .attach_batch(&su, mine, &[(flag, 1.0), (gold, 50.0), (owner, 7.0)])
            .expect("attach");
        let theirs = store.create_entity_for_match(MatchId(1)).expect("create");
        store
            .attach_batch(&su, theirs, &[(flag, 1.0), (gold, 90.0), (owner, 8.0)])
            .expect("attach");

        let unscoped = SnapshotEngine::build_full(&store, &runtime, MatchId(1), 1, None);
        assert_eq!(unscoped.module("inventory").expect("module").entities.len(), 2);

        let scoped =
            SnapshotEngine::build_full(&store, &runtime, MatchId(1), 1, Some(PlayerId(7)));
        let module = scoped.module("inventory").expect("module");
        assert_eq!(module.entities, vec![mine]);
        assert_eq!(module.column("GOLD").expect("gold").values, vec![50.0]);
    }

    #[test]
    fn column_lengths_stay_equal_within_a_module() {
        let mut store = ComponentStore::new(64, 16);
        let su = Principal::superuser();

        struct Grid;
        impl stormstack_modules::GameModule for Grid {
            fn descriptor(&self) -> &stormstack_modules::ModuleDescriptor {
                static DESC: std::sync::OnceLock<stormstack_modules::ModuleDescriptor> =
                    std::sync::OnceLock::new();
                DESC.get_or_init(|| stormstack_modules::ModuleDescriptor {
                    name: "grid".to_string(),
                    version: ModuleVersion::new(1, 0, 0),
                    components: vec![
                        stormstack_modules::ComponentSpec::new("POSITION_X", Permission::Read),
                        stormstack_modules::ComponentSpec::new("POSITION_Y", Permission::Read),
                    ],
                    commands: vec![],
                    systems: vec![],
                    flag_component: "grid_flag".to_string(),
                    exports: vec![],
                    dependencies: vec![],
                })
            }
            fn systems(&self) -> Vec<Arc<dyn stormstack_modules::System>> {
                Vec::new()
            }
            fn execute(
                &self,
                command: &str,
                _args: &stormstack_modules::CommandArgs,
                _ctx: &mut stormstack_modules::CommandContext<'_>,
            ) -> Result<()> {
                Err(StormError::UnknownCommand(command.to_string()))
            }
        }

        let runtime =
            ModuleRuntime::new(vec![Arc::new(Grid)], store.registry_mut()).expect("runtime");
        let flag = runtime.resolve("grid").expect("module").flag;
        let x = store.registry().id_of("POSITION_X").expect("x");

        // One entity has only X; columns must still align.
        let e1 = store.create_entity_for_match(MatchId(1)).expect("create");
        store.attach_batch(&su, e1, &[(flag, 1.0), (x, 4.0)]).expect("attach");
        let e2 = store.create_entity_for_match(MatchId(1)).expect("create");
        store.attach(&su, e2, flag, 1.0).expect("attach");

        let snapshot = SnapshotEngine::build_full(&store, &runtime, MatchId(1), 1, None);
        let module = snapshot.module("grid").expect("module");
        for column in &module.components {
            assert_eq!(column.values.len(), module.entities.len());
        }
        assert!(module.column("POSITION_Y").expect("y").values[0].is_nan());
    }
}
