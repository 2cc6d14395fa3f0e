//! Module descriptors and command schemas.
//!
//! A descriptor is the registry-supplied surface of a module: its
//! components, commands, systems, flag component, exports, and the
//! dependencies a compound module composes. Command payloads are typed at
//! the boundary; execution code never sees raw unchecked maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stormstack_core::{EntityId, ModuleVersion, Result, StormError};
use stormstack_ecs::Permission;

/// A component contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component name.
    pub name: String,
    /// Access level of the column.
    pub permission: Permission,
}

impl ComponentSpec {
    /// Create a component spec.
    #[must_use]
    pub fn new(name: impl Into<String>, permission: Permission) -> Self {
        Self {
            name: name.into(),
            permission,
        }
    }
}

/// Declared type of one command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
    /// IEEE single-precision float.
    Float,
    /// Integer, encoded into the float model.
    Int,
    /// Boolean, encoded as 0.0 / 1.0.
    Bool,
    /// 64-bit identifier, encoded into the float model.
    Id,
}

impl TypeTag {
    /// Human-readable tag name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "Float",
            Self::Int => "Int",
            Self::Bool => "Bool",
            Self::Id => "Id",
        }
    }
}

/// Coerced, typed command arguments.
///
/// Values live in the store's float model; helpers recover the declared
/// integral shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs(BTreeMap<String, f64>);

impl CommandArgs {
    /// Read a float argument.
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f32> {
        self.0.get(name).map(|v| *v as f32)
    }

    /// Read an integer argument.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).map(|v| *v as i64)
    }

    /// Read a boolean argument.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).map(|v| *v != 0.0)
    }

    /// Read an identifier argument.
    #[must_use]
    pub fn id(&self, name: &str) -> Option<u64> {
        self.0.get(name).map(|v| *v as u64)
    }

    /// Read an entity-id argument.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<EntityId> {
        self.id(name).map(EntityId)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A named command with its declared parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name, unique per container.
    pub name: String,
    /// Parameter name → declared type.
    pub params: BTreeMap<String, TypeTag>,
}

impl CommandSpec {
    /// Create a command spec.
    #[must_use]
    pub fn new(name: impl Into<String>, params: impl IntoIterator<Item = (&'static str, TypeTag)>) -> Self {
        Self {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Coerce a JSON payload against the schema.
    ///
    /// Every declared field must be present and convertible; extra fields
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns `TypeError` naming the first offending field.
    pub fn coerce(&self, payload: &serde_json::Value) -> Result<CommandArgs> {
        let mut args = BTreeMap::new();
        for (field, tag) in &self.params {
            let raw = payload.get(field).ok_or_else(|| StormError::TypeError {
                field: field.clone(),
                expected: tag.name(),
            })?;
            let value = Self::convert(raw, *tag).ok_or_else(|| StormError::TypeError {
                field: field.clone(),
                expected: tag.name(),
            })?;
            args.insert(field.clone(), value);
        }
        Ok(CommandArgs(args))
    }

    fn convert(raw: &serde_json::Value, tag: TypeTag) -> Option<f64> {
        match tag {
            TypeTag::Float => raw.as_f64(),
            TypeTag::Int => raw.as_i64().map(|v| v as f64),
            TypeTag::Id => raw.as_u64().map(|v| v as f64),
            TypeTag::Bool => raw.as_bool().map(|b| if b { 1.0 } else { 0.0 }),
        }
    }
}

/// A dependency of a compound module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependency {
    /// Required module name.
    pub name: String,
    /// Required version; satisfied when the resolved major matches and
    /// the resolved minor is at least this minor.
    pub version: ModuleVersion,
}

impl ModuleDependency {
    /// Create a dependency requirement.
    #[must_use]
    pub fn new(name: impl Into<String>, version: ModuleVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Registry-supplied module surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name, unique per container.
    pub name: String,
    /// Module version.
    pub version: ModuleVersion,
    /// Components the module contributes.
    pub components: Vec<ComponentSpec>,
    /// Commands the module handles.
    pub commands: Vec<CommandSpec>,
    /// System names, in the module's declared run order.
    pub systems: Vec<String>,
    /// Name of the Private flag component marking participating entities.
    pub flag_component: String,
    /// Names of callable handles other modules may depend on.
    pub exports: Vec<String>,
    /// Dependencies (non-empty for compound modules).
    pub dependencies: Vec<ModuleDependency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_position_spec() -> CommandSpec {
        CommandSpec::new(
            "setPosition",
            [
                ("entityId", TypeTag::Id),
                ("x", TypeTag::Float),
                ("y", TypeTag::Float),
            ],
        )
    }

    #[test]
    fn coerce_accepts_declared_fields() {
        let spec = set_position_spec();
        let args = spec
            .coerce(&serde_json::json!({"entityId": 42, "x": 4.0, "y": 5}))
            .expect("coerce");
        assert_eq!(args.entity("entityId"), Some(EntityId(42)));
        assert_eq!(args.float("x"), Some(4.0));
        assert_eq!(args.float("y"), Some(5.0));
    }

    #[test]
    fn coerce_rejects_missing_field() {
        let spec = set_position_spec();
        let result = spec.coerce(&serde_json::json!({"entityId": 42, "x": 4.0}));
        match result {
            Err(StormError::TypeError { field, expected }) => {
                assert_eq!(field, "y");
                assert_eq!(expected, "Float");
            }
            other => panic!("expected TypeError, got {other:?}"),
        }
    }

    #[test]
    fn coerce_rejects_wrong_type() {
        let spec = set_position_spec();
        let result = spec.coerce(&serde_json::json!({"entityId": "nope", "x": 1.0, "y": 2.0}));
        assert!(matches!(
            result,
            Err(StormError::TypeError { field, .. }) if field == "entityId"
        ));
    }

    #[test]
    fn coerce_ignores_extra_fields() {
        let spec = CommandSpec::new("spawn", [("entityType", TypeTag::Int)]);
        let args = spec
            .coerce(&serde_json::json!({"entityType": 3, "debug": true}))
            .expect("coerce");
        assert_eq!(args.int("entityType"), Some(3));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn bool_encodes_into_float_model() {
        let spec = CommandSpec::new("toggle", [("on", TypeTag::Bool)]);
        let args = spec.coerce(&serde_json::json!({"on": true})).expect("coerce");
        assert_eq!(args.bool("on"), Some(true));
        assert_eq!(args.float("on"), Some(1.0));
    }

    #[test]
    fn int_rejects_fractional_json() {
        let spec = CommandSpec::new("spawn", [("entityType", TypeTag::Int)]);
        let result = spec.coerce(&serde_json::json!({"entityType": 3.5}));
        assert!(matches!(result, Err(StormError::TypeError { .. })));
    }
}
