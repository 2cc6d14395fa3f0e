//! Snapshot and delta wire formats.
//!
//! A snapshot is columnar: within one module, the i-th element of every
//! component's `values` array refers to the same entity slot, and the
//! `entities` array names those slots in ascending entity-id order. The
//! legacy form collapses the module list into nested maps for older
//! consumers; emitters support both.

use crate::id::{EntityId, MatchId};
use crate::version::ModuleVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One component column within a module snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentColumn {
    /// Component name.
    pub name: String,
    /// Values aligned with the module's entity order.
    pub values: Vec<f32>,
}

// NaN is the "absent" sentinel; two absences compare equal.
impl PartialEq for ComponentColumn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

/// Per-module slice of a match snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSnapshot {
    /// Module name.
    pub name: String,
    /// Resolved module version.
    pub version: ModuleVersion,
    /// Entity slots in ascending id order.
    pub entities: Vec<EntityId>,
    /// Exported component columns, all of length `entities.len()`.
    pub components: Vec<ComponentColumn>,
}

impl ModuleSnapshot {
    /// Look up a component column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ComponentColumn> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Full snapshot of one match at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    /// The match.
    pub match_id: MatchId,
    /// The tick the snapshot was taken at.
    pub tick: u64,
    /// Per-module columnar state.
    pub modules: Vec<ModuleSnapshot>,
}

impl MatchSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new(match_id: MatchId, tick: u64) -> Self {
        Self {
            match_id,
            tick,
            modules: Vec::new(),
        }
    }

    /// Look up a module slice by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleSnapshot> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Convert to the legacy nested-map wire form.
    #[must_use]
    pub fn to_legacy(&self) -> LegacySnapshot {
        let mut data = BTreeMap::new();
        for module in &self.modules {
            let columns: BTreeMap<String, Vec<f32>> = module
                .components
                .iter()
                .map(|c| (c.name.clone(), c.values.clone()))
                .collect();
            data.insert(module.name.clone(), columns);
        }
        LegacySnapshot {
            match_id: self.match_id,
            tick: self.tick,
            data,
        }
    }
}

/// Legacy snapshot wire form: `{matchId, tick, data: {module: {component: [values]}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySnapshot {
    /// The match.
    pub match_id: MatchId,
    /// The tick.
    pub tick: u64,
    /// Module name → component name → values.
    pub data: BTreeMap<String, BTreeMap<String, Vec<f32>>>,
}

/// An entity newly visible to a module, with its component values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedEntity {
    /// The entity.
    pub entity: EntityId,
    /// Component name → value for every exported column the entity carries.
    pub values: BTreeMap<String, f32>,
}

/// A single value change at a stable index of the prior snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    /// Index into the prior snapshot's entity order for this module.
    pub index: usize,
    /// Component name.
    pub component: String,
    /// The new value.
    pub value: f32,
}

/// Per-module slice of a delta snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDelta {
    /// Module name.
    pub name: String,
    /// Entities that joined the module's flag set since `from_tick`.
    pub added: Vec<AddedEntity>,
    /// Entities that left the module's flag set.
    pub removed: Vec<EntityId>,
    /// Value changes on surviving entities, addressed by prior index.
    pub changed: Vec<ValueChange>,
}

impl ModuleDelta {
    /// Create an empty module delta.
    #[must_use]
    pub const fn new(name: String) -> Self {
        Self {
            name,
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
        }
    }

    /// Whether the module saw no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Minimal change set between two ticks of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSnapshot {
    /// The match.
    pub match_id: MatchId,
    /// Tick of the prior snapshot (exclusive).
    pub from_tick: u64,
    /// Tick of the new snapshot (inclusive).
    pub to_tick: u64,
    /// Per-module change sets; unchanged modules are omitted.
    pub modules: Vec<ModuleDelta>,
}

impl DeltaSnapshot {
    /// Create an empty delta.
    #[must_use]
    pub const fn new(match_id: MatchId, from_tick: u64, to_tick: u64) -> Self {
        Self {
            match_id,
            from_tick,
            to_tick,
            modules: Vec::new(),
        }
    }

    /// Whether the delta carries no changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.iter().all(ModuleDelta::is_empty)
    }

    /// Total number of changes in this delta.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.modules
            .iter()
            .map(|m| m.added.len() + m.removed.len() + m.changed.len())
            .sum()
    }
}
