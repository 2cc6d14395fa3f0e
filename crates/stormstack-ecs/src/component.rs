//! Component definitions and the per-container component registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stormstack_core::{ComponentId, IdAllocator, Result, StormError};
use tracing::debug;

/// Name of the built-in match-membership component.
pub const MATCH_ID: &str = "MATCH_ID";

/// Name of the built-in entity-identity component.
pub const ENTITY_ID: &str = "ENTITY_ID";

/// Access level of a component column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Attachable only under a superuser principal. Never emitted in
    /// snapshots. Used for module-isolation flags.
    Private,
    /// World-visible via snapshots; mutable only by the owning module.
    Read,
    /// Full cross-module access. The default for unregistered components.
    Write,
}

/// A named, typed column identified by a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDef {
    /// Stable column id, allocated per container.
    pub id: ComponentId,
    /// Component name, unique per container.
    pub name: String,
    /// Access level.
    pub permission: Permission,
}

/// Per-container component registry.
///
/// Owns the column id allocator (created at container construction,
/// released with the container) and the built-in `MATCH_ID` / `ENTITY_ID`
/// definitions.
#[derive(Debug)]
pub struct ComponentRegistry {
    by_id: HashMap<ComponentId, ComponentDef>,
    by_name: HashMap<String, ComponentId>,
    allocator: IdAllocator,
    match_id: ComponentId,
    entity_id: ComponentId,
}

impl ComponentRegistry {
    /// Create a registry with the built-in components registered.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            allocator: IdAllocator::default(),
            match_id: ComponentId(0),
            entity_id: ComponentId(0),
        };
        registry.match_id = registry
            .insert(MATCH_ID.to_string(), Permission::Read)
            .id;
        registry.entity_id = registry
            .insert(ENTITY_ID.to_string(), Permission::Read)
            .id;
        registry
    }

    fn insert(&mut self, name: String, permission: Permission) -> &ComponentDef {
        let id = ComponentId(self.allocator.allocate());
        debug!(component = %name, %id, ?permission, "registering component");
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(
            id,
            ComponentDef {
                id,
                name,
                permission,
            },
        );
        &self.by_id[&id]
    }

    /// Register a component, allocating its column id.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the name is already taken.
    pub fn register(&mut self, name: &str, permission: Permission) -> Result<ComponentId> {
        if self.by_name.contains_key(name) {
            return Err(StormError::Conflict(format!(
                "component '{name}' already registered"
            )));
        }
        Ok(self.insert(name.to_string(), permission).id)
    }

    /// Look up a definition by id.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&ComponentDef> {
        self.by_id.get(&id)
    }

    /// Look up a column id by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Effective permission of a column. Components without an explicit
    /// registration default to `Write`.
    #[must_use]
    pub fn permission(&self, id: ComponentId) -> Permission {
        self.by_id
            .get(&id)
            .map_or(Permission::Write, |def| def.permission)
    }

    /// The built-in `MATCH_ID` column.
    #[must_use]
    pub const fn match_id(&self) -> ComponentId {
        self.match_id
    }

    /// The built-in `ENTITY_ID` column.
    #[must_use]
    pub const fn entity_id(&self) -> ComponentId {
        self.entity_id
    }

    /// All registered definitions.
    pub fn definitions(&self) -> impl Iterator<Item = &ComponentDef> {
        self.by_id.values()
    }

    /// Number of registered components.
    #[must_use]
    pub fn count(&self) -> usize {
        self.by_id.len()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_preregistered() {
        let registry = ComponentRegistry::new();
        assert_eq!(registry.id_of(MATCH_ID), Some(registry.match_id()));
        assert_eq!(registry.id_of(ENTITY_ID), Some(registry.entity_id()));
        assert_ne!(registry.match_id(), registry.entity_id());
        assert_eq!(registry.permission(registry.match_id()), Permission::Read);
    }

    #[test]
    fn register_allocates_fresh_ids() {
        let mut registry = ComponentRegistry::new();
        let a = registry.register("POSITION_X", Permission::Read).expect("register");
        let b = registry.register("POSITION_Y", Permission::Read).expect("register");
        assert_ne!(a, b);
        assert_eq!(registry.id_of("POSITION_X"), Some(a));
    }

    #[test]
    fn duplicate_name_conflicts() {
        let mut registry = ComponentRegistry::new();
        registry.register("HEALTH", Permission::Write).expect("register");
        let result = registry.register("HEALTH", Permission::Private);
        assert!(matches!(result, Err(StormError::Conflict(_))));
    }

    #[test]
    fn unknown_components_default_to_write() {
        let registry = ComponentRegistry::new();
        assert_eq!(registry.permission(ComponentId(999)), Permission::Write);
    }

    #[test]
    fn registries_are_container_scoped() {
        // Two registries allocate independently: ids are per container,
        // never process-global.
        let mut a = ComponentRegistry::new();
        let mut b = ComponentRegistry::new();
        let id_a = a.register("X", Permission::Write).expect("register");
        let id_b = b.register("Y", Permission::Write).expect("register");
        assert_eq!(id_a, id_b);
    }
}
