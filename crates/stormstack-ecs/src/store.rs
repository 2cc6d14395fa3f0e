//! The columnar component store.
//!
//! Storage is a mapping component id → column of (entity id → f32). The
//! hot-path `entities_with_components` intersection is cached with an LRU
//! keyed on the sorted component-id list; any attach/remove touching a
//! listed column invalidates the affected cache entries under the same
//! mutable borrow as the visible-state change.

use crate::cache::QueryCache;
use crate::component::{ComponentRegistry, Permission};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stormstack_core::{ComponentId, EntityId, IdAllocator, MatchId, Principal, Result, StormError};
use tracing::trace;

/// Columnar entity/component store for one container.
pub struct ComponentStore {
    registry: ComponentRegistry,
    columns: HashMap<ComponentId, HashMap<EntityId, f32>>,
    entities: HashSet<EntityId>,
    entity_capacity: usize,
    entity_allocator: IdAllocator,
    cache: Mutex<QueryCache>,
}

impl ComponentStore {
    /// Create a store with the given entity-slot capacity and query-cache bound.
    #[must_use]
    pub fn new(entity_capacity: usize, query_cache_capacity: usize) -> Self {
        Self {
            registry: ComponentRegistry::new(),
            columns: HashMap::new(),
            entities: HashSet::new(),
            entity_capacity,
            entity_allocator: IdAllocator::default(),
            cache: Mutex::new(QueryCache::new(query_cache_capacity)),
        }
    }

    /// The component registry.
    #[must_use]
    pub const fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Mutable access to the component registry.
    pub const fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Allocate an entity slot for a match and attach the built-in
    /// `MATCH_ID` and `ENTITY_ID` components.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExhausted` when no slots remain.
    pub fn create_entity_for_match(&mut self, match_id: MatchId) -> Result<EntityId> {
        if self.entities.len() >= self.entity_capacity {
            return Err(StormError::CapacityExhausted(format!(
                "all {} entity slots in use",
                self.entity_capacity
            )));
        }
        let entity = EntityId(self.entity_allocator.allocate());
        self.entities.insert(entity);
        self.set_value(entity, self.registry.match_id(), match_id.0 as f32);
        self.set_value(entity, self.registry.entity_id(), entity.0 as f32);
        trace!(%entity, %match_id, "created entity");
        Ok(entity)
    }

    /// Attach (or overwrite) a component value on an entity, creating the
    /// entity slot if missing.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for a Private component without a
    /// superuser principal, or `CapacityExhausted` when a new slot is
    /// needed and none remain.
    pub fn attach(
        &mut self,
        principal: &Principal,
        entity: EntityId,
        component: ComponentId,
        value: f32,
    ) -> Result<()> {
        self.check_mutation(principal, component)?;
        self.ensure_slot(entity)?;
        self.set_value(entity, component, value);
        Ok(())
    }

    /// Attach several components at once. Permissions are validated for
    /// every pair before any write happens: a denied batch leaves the
    /// store unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attach`].
    pub fn attach_batch(
        &mut self,
        principal: &Principal,
        entity: EntityId,
        pairs: &[(ComponentId, f32)],
    ) -> Result<()> {
        for (component, _) in pairs {
            self.check_mutation(principal, *component)?;
        }
        self.ensure_slot(entity)?;
        for (component, value) in pairs {
            self.set_value(entity, *component, *value);
        }
        Ok(())
    }

    /// Remove a component from an entity.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for a Private component without a
    /// superuser principal, or `EntityNotFound` for an unknown slot.
    pub fn remove(
        &mut self,
        principal: &Principal,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<()> {
        self.check_mutation(principal, component)?;
        if !self.entities.contains(&entity) {
            return Err(StormError::EntityNotFound(entity));
        }
        if let Some(column) = self.columns.get_mut(&component) {
            if column.remove(&entity).is_some() {
                self.cache.lock().invalidate_column(component);
            }
        }
        Ok(())
    }

    /// Delete an entity, clearing it from every column.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown slot.
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<()> {
        if !self.entities.remove(&entity) {
            return Err(StormError::EntityNotFound(entity));
        }
        let mut cache = self.cache.lock();
        for (component, column) in &mut self.columns {
            if column.remove(&entity).is_some() {
                cache.invalidate_column(*component);
            }
        }
        trace!(%entity, "deleted entity");
        Ok(())
    }

    /// Read a component value. `NaN` means absent.
    #[must_use]
    pub fn get(&self, entity: EntityId, component: ComponentId) -> f32 {
        self.columns
            .get(&component)
            .and_then(|column| column.get(&entity))
            .copied()
            .unwrap_or(f32::NAN)
    }

    /// Read several component values at once, `NaN` for absences.
    #[must_use]
    pub fn get_many(&self, entity: EntityId, components: &[ComponentId]) -> Vec<f32> {
        components.iter().map(|c| self.get(entity, *c)).collect()
    }

    /// Whether the entity carries the component.
    #[must_use]
    pub fn has(&self, entity: EntityId, component: ComponentId) -> bool {
        self.columns
            .get(&component)
            .is_some_and(|column| column.contains_key(&entity))
    }

    /// Whether the entity slot exists.
    #[must_use]
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Number of live entity slots.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All slots carrying ALL of the listed components, ascending by id.
    ///
    /// This is the tick hot path; results are cached keyed on the sorted
    /// component-id list and invalidated on any write touching a listed
    /// column.
    #[must_use]
    pub fn entities_with_components(&self, components: &[ComponentId]) -> Arc<Vec<EntityId>> {
        let mut key: Vec<ComponentId> = components.to_vec();
        key.sort_unstable();
        key.dedup();

        if let Some(hit) = self.cache.lock().get(&key) {
            return hit;
        }

        let result = Arc::new(self.intersect(&key));
        self.cache.lock().insert(key, Arc::clone(&result));
        result
    }

    /// All entities whose `MATCH_ID` equals the given match.
    #[must_use]
    pub fn entities_in_match(&self, match_id: MatchId) -> Vec<EntityId> {
        let wanted = match_id.0 as f32;
        let mut out: Vec<EntityId> = self
            .columns
            .get(&self.registry.match_id())
            .map(|column| {
                column
                    .iter()
                    .filter(|(_, v)| **v == wanted)
                    .map(|(e, _)| *e)
                    .collect()
            })
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    fn intersect(&self, key: &[ComponentId]) -> Vec<EntityId> {
        if key.is_empty() {
            let mut all: Vec<EntityId> = self.entities.iter().copied().collect();
            all.sort_unstable();
            return all;
        }

        // Start from the smallest column to keep the scan tight.
        let mut ordered: Vec<&HashMap<EntityId, f32>> = Vec::with_capacity(key.len());
        for component in key {
            match self.columns.get(component) {
                Some(column) => ordered.push(column),
                None => return Vec::new(),
            }
        }
        ordered.sort_by_key(|column| column.len());

        let Some((seed, rest)) = ordered.split_first() else {
            return Vec::new();
        };
        let mut result: Vec<EntityId> = seed
            .keys()
            .filter(|entity| rest.iter().all(|column| column.contains_key(*entity)))
            .copied()
            .collect();
        result.sort_unstable();
        result
    }

    fn ensure_slot(&mut self, entity: EntityId) -> Result<()> {
        if self.entities.contains(&entity) {
            return Ok(());
        }
        if self.entities.len() >= self.entity_capacity {
            return Err(StormError::CapacityExhausted(format!(
                "all {} entity slots in use",
                self.entity_capacity
            )));
        }
        self.entities.insert(entity);
        Ok(())
    }

    fn check_mutation(&self, principal: &Principal, component: ComponentId) -> Result<()> {
        if self.registry.permission(component) == Permission::Private && !principal.is_superuser() {
            let name = self
                .registry
                .get(component)
                .map_or_else(|| component.to_string(), |def| def.name.clone());
            return Err(StormError::PermissionDenied(format!(
                "component '{name}' is PRIVATE"
            )));
        }
        Ok(())
    }

    fn set_value(&mut self, entity: EntityId, component: ComponentId, value: f32) {
        self.columns.entry(component).or_default().insert(entity, value);
        self.cache.lock().invalidate_column(component);
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("entities", &self.entities.len())
            .field("columns", &self.columns.len())
            .finish()
    }
}

/// Reader-writer decorator for shared store access.
///
/// `parking_lot::RwLock` admits many concurrent readers or one exclusive
/// writer and blocks new readers while a writer waits, so dense scans
/// cannot starve writes. No reader observes a partial multi-column write.
pub type SharedStore = Arc<RwLock<ComponentStore>>;

/// Wrap a store for shared access.
#[must_use]
pub fn shared_store(store: ComponentStore) -> SharedStore {
    Arc::new(RwLock::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ENTITY_ID, MATCH_ID};

    fn store() -> ComponentStore {
        ComponentStore::new(1024, 64)
    }

    #[test]
    fn created_entity_carries_builtins() {
        let mut s = store();
        let m = MatchId(7);
        let e = s.create_entity_for_match(m).expect("create");

        let match_col = s.registry().id_of(MATCH_ID).expect("column");
        let entity_col = s.registry().id_of(ENTITY_ID).expect("column");
        assert_eq!(s.get(e, match_col), 7.0);
        assert_eq!(s.get(e, entity_col), e.0 as f32);
    }

    #[test]
    fn capacity_exhausted_when_slots_full() {
        let mut s = ComponentStore::new(2, 64);
        s.create_entity_for_match(MatchId(1)).expect("first");
        s.create_entity_for_match(MatchId(1)).expect("second");
        let result = s.create_entity_for_match(MatchId(1));
        assert!(matches!(result, Err(StormError::CapacityExhausted(_))));
    }

    #[test]
    fn get_returns_nan_for_absent() {
        let mut s = store();
        let e = s.create_entity_for_match(MatchId(1)).expect("create");
        let c = s.registry_mut().register("HEALTH", Permission::Write).expect("register");
        assert!(s.get(e, c).is_nan());
        assert!(!s.has(e, c));

        s.attach(&Principal::superuser(), e, c, 100.0).expect("attach");
        assert_eq!(s.get(e, c), 100.0);
        assert!(s.has(e, c));
    }

    #[test]
    fn attach_creates_missing_slot() {
        let mut s = store();
        let c = s.registry_mut().register("X", Permission::Write).expect("register");
        let e = EntityId(42);
        assert!(!s.contains_entity(e));

        s.attach(&Principal::anonymous(), e, c, 1.0).expect("attach");
        assert!(s.contains_entity(e));
        assert_eq!(s.get(e, c), 1.0);
    }

    #[test]
    fn private_attach_requires_superuser() {
        let mut s = store();
        let e = s.create_entity_for_match(MatchId(1)).expect("create");
        let flag = s
            .registry_mut()
            .register("health_flag", Permission::Private)
            .expect("register");

        let denied = s.attach(&Principal::player(stormstack_core::PlayerId(9)), e, flag, 1.0);
        assert!(matches!(denied, Err(StormError::PermissionDenied(_))));
        assert!(!s.has(e, flag));

        s.attach(&Principal::superuser(), e, flag, 1.0).expect("superuser attach");
        assert!(s.has(e, flag));
    }

    #[test]
    fn denied_batch_leaves_store_unchanged() {
        let mut s = store();
        let e = s.create_entity_for_match(MatchId(1)).expect("create");
        let open = s.registry_mut().register("OPEN", Permission::Write).expect("register");
        let flag = s
            .registry_mut()
            .register("flag", Permission::Private)
            .expect("register");

        let result = s.attach_batch(
            &Principal::anonymous(),
            e,
            &[(open, 5.0), (flag, 1.0)],
        );
        assert!(matches!(result, Err(StormError::PermissionDenied(_))));
        // The batch validated before writing anything, including the open column.
        assert!(!s.has(e, open));
        assert!(!s.has(e, flag));
    }

    #[test]
    fn delete_entity_clears_all_columns() {
        let mut s = store();
        let e = s.create_entity_for_match(MatchId(1)).expect("create");
        let c = s.registry_mut().register("X", Permission::Write).expect("register");
        s.attach(&Principal::superuser(), e, c, 3.0).expect("attach");

        s.delete_entity(e).expect("delete");
        assert!(!s.contains_entity(e));
        assert!(s.get(e, c).is_nan());
        assert!(matches!(
            s.delete_entity(e),
            Err(StormError::EntityNotFound(_))
        ));
    }

    #[test]
    fn create_delete_leaves_match_set_unchanged() {
        let mut s = store();
        let m = MatchId(3);
        let before = s.entities_in_match(m);

        let e = s.create_entity_for_match(m).expect("create");
        s.delete_entity(e).expect("delete");

        assert_eq!(s.entities_in_match(m), before);
    }

    #[test]
    fn intersection_requires_all_components() {
        let mut s = store();
        let su = Principal::superuser();
        let a = s.registry_mut().register("A", Permission::Write).expect("register");
        let b = s.registry_mut().register("B", Permission::Write).expect("register");

        let e1 = s.create_entity_for_match(MatchId(1)).expect("create");
        let e2 = s.create_entity_for_match(MatchId(1)).expect("create");
        let e3 = s.create_entity_for_match(MatchId(1)).expect("create");

        s.attach(&su, e1, a, 1.0).expect("attach");
        s.attach(&su, e1, b, 1.0).expect("attach");
        s.attach(&su, e2, a, 1.0).expect("attach");
        s.attach(&su, e3, b, 1.0).expect("attach");

        let both = s.entities_with_components(&[a, b]);
        assert_eq!(*both, vec![e1]);

        let only_a = s.entities_with_components(&[a]);
        assert_eq!(*only_a, vec![e1, e2]);
    }

    #[test]
    fn results_are_sorted_ascending() {
        let mut s = store();
        let c = s.registry_mut().register("C", Permission::Write).expect("register");
        let su = Principal::superuser();
        // Attach in descending id order.
        for id in [30u64, 20, 10] {
            s.attach(&su, EntityId(id), c, 0.0).expect("attach");
        }
        let result = s.entities_with_components(&[c]);
        assert_eq!(*result, vec![EntityId(10), EntityId(20), EntityId(30)]);
    }

    #[test]
    fn cached_query_invalidated_by_touching_write() {
        let mut s = store();
        let su = Principal::superuser();
        let a = s.registry_mut().register("A", Permission::Write).expect("register");

        let e1 = s.create_entity_for_match(MatchId(1)).expect("create");
        s.attach(&su, e1, a, 1.0).expect("attach");

        let first = s.entities_with_components(&[a]);
        assert_eq!(first.len(), 1);

        let e2 = s.create_entity_for_match(MatchId(1)).expect("create");
        s.attach(&su, e2, a, 1.0).expect("attach");

        let second = s.entities_with_components(&[a]);
        assert_eq!(*second, vec![e1, e2]);
    }

    #[test]
    fn cached_query_survives_unrelated_write() {
        let mut s = store();
        let su = Principal::superuser();
        let a = s.registry_mut().register("A", Permission::Write).expect("register");
        let b = s.registry_mut().register("B", Permission::Write).expect("register");

        let e = s.create_entity_for_match(MatchId(1)).expect("create");
        s.attach(&su, e, a, 1.0).expect("attach");

        let first = s.entities_with_components(&[a]);
        s.attach(&su, e, b, 1.0).expect("attach");
        let second = s.entities_with_components(&[a]);

        // Same cached Arc: the write to B never touched A's entry.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_query_returns_all_entities() {
        let mut s = store();
        let e1 = s.create_entity_for_match(MatchId(1)).expect("create");
        let e2 = s.create_entity_for_match(MatchId(2)).expect("create");
        let all = s.entities_with_components(&[]);
        assert_eq!(*all, vec![e1, e2]);
    }

    #[test]
    fn entities_in_match_filters_by_match() {
        let mut s = store();
        let e1 = s.create_entity_for_match(MatchId(1)).expect("create");
        let _e2 = s.create_entity_for_match(MatchId(2)).expect("create");
        let e3 = s.create_entity_for_match(MatchId(1)).expect("create");
        assert_eq!(s.entities_in_match(MatchId(1)), vec![e1, e3]);
    }

    #[test]
    fn shared_store_allows_concurrent_reads() {
        let shared = shared_store(store());
        {
            let mut guard = shared.write();
            guard.create_entity_for_match(MatchId(1)).expect("create");
        }
        let r1 = shared.read();
        let r2 = shared.read();
        assert_eq!(r1.entity_count(), 1);
        assert_eq!(r2.entity_count(), 1);
    }
}
