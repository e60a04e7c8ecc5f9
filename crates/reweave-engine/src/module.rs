//! Module visibility expansion
//!
//! A named module's read/export/open/use/provide sets can only grow.
//! Expansion validates everything first under the module's lock, then
//! unions the new entries in; a rejected expansion changes nothing. The
//! unnamed module accepts any expansion as a successful no-op.

use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Description of one named module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name
    pub name: String,
    /// Packages belonging to this module
    pub packages: FxHashSet<String>,
    /// Member types, each with the set of services it implements
    pub members: FxHashMap<String, FxHashSet<String>>,
    /// Modules this module reads
    pub reads: FxHashSet<String>,
    /// Exported packages and the modules they are exported to
    pub exports: FxHashMap<String, FxHashSet<String>>,
    /// Opened packages and the modules they are opened to
    pub opens: FxHashMap<String, FxHashSet<String>>,
    /// Services this module uses
    pub uses: FxHashSet<String>,
    /// Services this module provides, with implementations in order
    pub provides: FxHashMap<String, Vec<String>>,
}

impl ModuleDescriptor {
    /// Create a descriptor for `name` with the given packages
    pub fn new<I, S>(name: impl Into<String>, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            packages: packages.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Declare `member` as a type of this module implementing `services`
    pub fn add_member<I, S>(&mut self, member: impl Into<String>, services: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members
            .insert(member.into(), services.into_iter().map(Into::into).collect());
    }
}

/// Additional visibility a caller wants to grant a module
#[derive(Debug, Clone, Default)]
pub struct ModuleExpansion {
    /// Extra modules to read
    pub reads: FxHashSet<String>,
    /// Extra export targets per package
    pub exports: FxHashMap<String, FxHashSet<String>>,
    /// Extra open targets per package
    pub opens: FxHashMap<String, FxHashSet<String>>,
    /// Extra services to use
    pub uses: FxHashSet<String>,
    /// Extra providers per service
    pub provides: FxHashMap<String, Vec<String>>,
}

impl ModuleExpansion {
    /// An expansion granting nothing
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Thread-safe registry of named modules
pub struct ModuleRegistry {
    modules: DashMap<String, Arc<Mutex<ModuleDescriptor>>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
        }
    }

    /// Register a named module.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty name, `DuplicateDefinition` if the
    /// name is taken.
    pub fn define(&self, descriptor: ModuleDescriptor) -> EngineResult<()> {
        use dashmap::mapref::entry::Entry;

        if descriptor.name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "module name must not be empty".to_string(),
            ));
        }
        match self.modules.entry(descriptor.name.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateDefinition(descriptor.name)),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(descriptor)));
                Ok(())
            }
        }
    }

    /// Snapshot of a module's current descriptor
    pub fn descriptor(&self, name: &str) -> EngineResult<ModuleDescriptor> {
        self.handle(name).map(|m| m.lock().clone())
    }

    /// A module is modifiable iff it is named and known to the registry
    pub fn is_modifiable(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Expand a module's visibility sets.
    ///
    /// `module` of `None` targets the unnamed module: always a successful
    /// no-op. For a named module, every package/provider is validated under
    /// the module's lock before the union, so a failed expansion leaves the
    /// descriptor untouched and existing entries are never removed.
    pub fn expand(&self, module: Option<&str>, expansion: &ModuleExpansion) -> EngineResult<()> {
        let name = match module {
            Some(name) => name,
            None => return Ok(()),
        };
        let handle = self.handle(name)?;
        let mut descriptor = handle.lock();

        // Validate everything before touching anything
        for (package, targets) in expansion.exports.iter().chain(expansion.opens.iter()) {
            if !descriptor.packages.contains(package) {
                return Err(EngineError::InvalidArgument(format!(
                    "package {package} does not belong to module {name}"
                )));
            }
            if targets.is_empty() {
                return Err(EngineError::InvalidArgument(format!(
                    "empty target set for package {package}"
                )));
            }
        }
        for (service, impls) in &expansion.provides {
            if impls.is_empty() {
                return Err(EngineError::InvalidArgument(format!(
                    "empty provider list for service {service}"
                )));
            }
            for provider in impls {
                match descriptor.members.get(provider) {
                    None => {
                        return Err(EngineError::InvalidArgument(format!(
                            "provider {provider} is not a member of module {name}"
                        )));
                    }
                    Some(services) if !services.contains(service) => {
                        return Err(EngineError::InvalidArgument(format!(
                            "provider {provider} does not implement service {service}"
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        // Union only; nothing is ever removed
        descriptor.reads.extend(expansion.reads.iter().cloned());
        for (package, targets) in &expansion.exports {
            descriptor
                .exports
                .entry(package.clone())
                .or_default()
                .extend(targets.iter().cloned());
        }
        for (package, targets) in &expansion.opens {
            descriptor
                .opens
                .entry(package.clone())
                .or_default()
                .extend(targets.iter().cloned());
        }
        descriptor.uses.extend(expansion.uses.iter().cloned());
        for (service, impls) in &expansion.provides {
            let existing = descriptor.provides.entry(service.clone()).or_default();
            for provider in impls {
                if !existing.contains(provider) {
                    existing.push(provider.clone());
                }
            }
        }

        debug!(module = name, "module visibility expanded");
        Ok(())
    }

    fn handle(&self, name: &str) -> EngineResult<Arc<Mutex<ModuleDescriptor>>> {
        self.modules
            .get(name)
            .map(|m| m.value().clone())
            .ok_or_else(|| EngineError::NotFound(format!("module {name}")))
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_module() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        let mut descriptor = ModuleDescriptor::new("app.core", ["app.api", "app.impl"]);
        descriptor.add_member("app.impl.JsonCodec", ["app.api.Codec"]);
        registry.define(descriptor).unwrap();
        registry
    }

    fn set<const N: usize>(items: [&str; N]) -> FxHashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_unions_reads_and_exports() {
        let registry = registry_with_module();
        let mut expansion = ModuleExpansion::empty();
        expansion.reads = set(["lib.other"]);
        expansion.exports.insert("app.api".to_string(), set(["lib.client"]));

        registry.expand(Some("app.core"), &expansion).unwrap();
        // Overlapping second call is still a union, never a shrink
        registry.expand(Some("app.core"), &expansion).unwrap();

        let descriptor = registry.descriptor("app.core").unwrap();
        assert!(descriptor.reads.contains("lib.other"));
        assert_eq!(
            descriptor.exports.get("app.api"),
            Some(&set(["lib.client"]))
        );
    }

    #[test]
    fn test_expand_foreign_package_rejected() {
        let registry = registry_with_module();
        let mut expansion = ModuleExpansion::empty();
        expansion.reads = set(["lib.other"]);
        expansion.opens.insert("not.mine".to_string(), set(["x"]));

        let err = registry.expand(Some("app.core"), &expansion).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        // Validation failed before any union: reads unchanged too
        let descriptor = registry.descriptor("app.core").unwrap();
        assert!(descriptor.reads.is_empty());
    }

    #[test]
    fn test_expand_empty_target_set_rejected() {
        let registry = registry_with_module();
        let mut expansion = ModuleExpansion::empty();
        expansion.exports.insert("app.api".to_string(), set([]));
        assert!(matches!(
            registry.expand(Some("app.core"), &expansion),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_expand_provides_validation() {
        let registry = registry_with_module();

        // Non-member provider
        let mut expansion = ModuleExpansion::empty();
        expansion
            .provides
            .insert("app.api.Codec".to_string(), vec!["ghost.Type".to_string()]);
        assert!(registry.expand(Some("app.core"), &expansion).is_err());

        // Member that does not implement the service
        let mut expansion = ModuleExpansion::empty();
        expansion.provides.insert(
            "app.api.Logger".to_string(),
            vec!["app.impl.JsonCodec".to_string()],
        );
        assert!(registry.expand(Some("app.core"), &expansion).is_err());

        // Valid provider
        let mut expansion = ModuleExpansion::empty();
        expansion.provides.insert(
            "app.api.Codec".to_string(),
            vec!["app.impl.JsonCodec".to_string()],
        );
        registry.expand(Some("app.core"), &expansion).unwrap();

        let descriptor = registry.descriptor("app.core").unwrap();
        assert_eq!(
            descriptor.provides.get("app.api.Codec").unwrap(),
            &vec!["app.impl.JsonCodec".to_string()]
        );

        // Re-providing the same implementation does not duplicate it
        registry.expand(Some("app.core"), &expansion).unwrap();
        let descriptor = registry.descriptor("app.core").unwrap();
        assert_eq!(descriptor.provides.get("app.api.Codec").unwrap().len(), 1);
    }

    #[test]
    fn test_unnamed_module_is_noop() {
        let registry = registry_with_module();
        let mut expansion = ModuleExpansion::empty();
        expansion.opens.insert("not.mine".to_string(), set([]));
        // Would be rejected for a named module; unnamed always succeeds
        registry.expand(None, &expansion).unwrap();
    }

    #[test]
    fn test_unknown_module_not_found() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.expand(Some("ghost"), &ModuleExpansion::empty()),
            Err(EngineError::NotFound(_))
        ));
        assert!(!registry.is_modifiable("ghost"));
    }
}
