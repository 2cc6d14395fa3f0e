//! Per-container module runtime.
//!
//! Enabling modules is a two-pass operation: first every descriptor is
//! registered (names, components, flags), then dependencies are bound:
//! version checks, export existence, and a topological pass that rejects
//! cycles. Constructor-time cycles are impossible because handles resolve
//! by identifier only after registration.

use crate::descriptor::CommandSpec;
use crate::module::{GameModule, System};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stormstack_core::{ComponentId, Principal, Result, StormError};
use stormstack_ecs::{ComponentRegistry, Permission};
use tracing::debug;

/// A module enabled on a container, with its resolved column ids.
pub struct EnabledModule {
    /// The module instance.
    pub module: Arc<dyn GameModule>,
    /// The module's Private flag column.
    pub flag: ComponentId,
    /// Component name → resolved column id.
    pub components: HashMap<String, ComponentId>,
    /// Instantiated systems in declared order.
    pub systems: Vec<Arc<dyn System>>,
}

impl EnabledModule {
    /// The module's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.module.descriptor().name
    }
}

/// Runtime owning the modules enabled on one container.
pub struct ModuleRuntime {
    order: Vec<String>,
    modules: HashMap<String, EnabledModule>,
    flags: Vec<ComponentId>,
    superuser: Principal,
}

impl ModuleRuntime {
    /// Enable a set of modules, registering their components and flags
    /// into the container's registry and binding dependencies.
    ///
    /// # Errors
    ///
    /// - `Conflict` on duplicate module names.
    /// - `PreconditionFailed` on a missing dependency or version mismatch.
    /// - `UnresolvableModules` on a dependency cycle.
    pub fn new(
        modules: Vec<Arc<dyn GameModule>>,
        registry: &mut ComponentRegistry,
    ) -> Result<Self> {
        // Pass 1: register descriptors.
        let mut enabled: HashMap<String, EnabledModule> = HashMap::new();
        let mut insertion: Vec<String> = Vec::with_capacity(modules.len());
        for module in modules {
            let descriptor = module.descriptor().clone();
            if enabled.contains_key(&descriptor.name) {
                return Err(StormError::Conflict(format!(
                    "module '{}' enabled twice",
                    descriptor.name
                )));
            }

            let flag = registry.register(&descriptor.flag_component, Permission::Private)?;
            let mut components = HashMap::new();
            for spec in &descriptor.components {
                let id = registry.register(&spec.name, spec.permission)?;
                components.insert(spec.name.clone(), id);
            }

            debug!(module = %descriptor.name, version = %descriptor.version, "registered module");
            insertion.push(descriptor.name.clone());
            enabled.insert(
                descriptor.name.clone(),
                EnabledModule {
                    systems: module.systems(),
                    module,
                    flag,
                    components,
                },
            );
        }

        // Pass 2: bind dependencies and order systems.
        for name in &insertion {
            let descriptor = enabled[name].module.descriptor();
            for dependency in &descriptor.dependencies {
                let Some(resolved) = enabled.get(&dependency.name) else {
                    return Err(StormError::PreconditionFailed(format!(
                        "module '{name}' requires '{}' which is not enabled",
                        dependency.name
                    )));
                };
                let resolved_version = resolved.module.descriptor().version;
                if !resolved_version.satisfies(&dependency.version) {
                    return Err(StormError::PreconditionFailed(format!(
                        "module '{name}' requires '{}' {} but {resolved_version} is enabled",
                        dependency.name, dependency.version
                    )));
                }
            }
        }

        let order = Self::topological_order(&insertion, &enabled)?;
        let flags = order.iter().map(|name| enabled[name].flag).collect();

        Ok(Self {
            order,
            modules: enabled,
            flags,
            superuser: Principal::superuser(),
        })
    }

    /// Dependency-first topological order over the enabled set, stable in
    /// insertion order for independent modules.
    fn topological_order(
        insertion: &[String],
        enabled: &HashMap<String, EnabledModule>,
    ) -> Result<Vec<String>> {
        let mut order = Vec::with_capacity(insertion.len());
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        for name in insertion {
            Self::visit(name, enabled, &mut order, &mut visited, &mut in_stack)?;
        }
        Ok(order)
    }

    fn visit(
        name: &str,
        enabled: &HashMap<String, EnabledModule>,
        order: &mut Vec<String>,
        visited: &mut HashSet<String>,
        in_stack: &mut HashSet<String>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if in_stack.contains(name) {
            return Err(StormError::UnresolvableModules(format!(
                "dependency cycle through '{name}'"
            )));
        }
        in_stack.insert(name.to_string());

        if let Some(entry) = enabled.get(name) {
            for dependency in &entry.module.descriptor().dependencies {
                Self::visit(&dependency.name, enabled, order, visited, in_stack)?;
            }
        }

        in_stack.remove(name);
        visited.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Resolve a module by identifier.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&EnabledModule> {
        self.modules.get(name)
    }

    /// Resolve an export handle: the dependency module, checked to
    /// actually declare the export.
    ///
    /// # Errors
    ///
    /// Returns `ModuleNotFound` for an unknown module and
    /// `PreconditionFailed` for an undeclared export.
    pub fn export_handle(&self, module: &str, export: &str) -> Result<Arc<dyn GameModule>> {
        let entry = self
            .modules
            .get(module)
            .ok_or_else(|| StormError::ModuleNotFound(module.to_string()))?;
        if !entry
            .module
            .descriptor()
            .exports
            .iter()
            .any(|e| e == export)
        {
            return Err(StormError::PreconditionFailed(format!(
                "module '{module}' does not export '{export}'"
            )));
        }
        Ok(Arc::clone(&entry.module))
    }

    /// Enabled modules in dependency-topological order.
    pub fn modules(&self) -> impl Iterator<Item = &EnabledModule> {
        self.order.iter().map(|name| &self.modules[name])
    }

    /// Names of the enabled modules in topological order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Resolve a command by name across all enabled modules.
    #[must_use]
    pub fn find_command(&self, name: &str) -> Option<(&EnabledModule, &CommandSpec)> {
        for entry in self.modules() {
            if let Some(spec) = entry
                .module
                .descriptor()
                .commands
                .iter()
                .find(|c| c.name == name)
            {
                return Some((entry, spec));
            }
        }
        None
    }

    /// Flag columns of every enabled module, in topological order.
    #[must_use]
    pub fn flags(&self) -> &[ComponentId] {
        &self.flags
    }

    /// The in-process superuser used by the spawn/flag-attachment path.
    #[must_use]
    pub const fn superuser(&self) -> Principal {
        self.superuser
    }

    /// Number of enabled modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
