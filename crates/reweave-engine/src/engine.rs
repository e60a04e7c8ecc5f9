//! Engine facade
//!
//! Owns the definition store, transformer registry, coordinator, module
//! registry, search paths, prefix table and frame tracker, and exposes the
//! instrumentation surface over them. One `Engine` is one lifetime-scoped
//! context; nothing here is ambient global state.

use crate::config::EngineConfig;
use crate::coordinator::{validate_definition, BatchReport, RedefinitionCoordinator, UnitDefinition};
use crate::error::{EngineError, EngineResult};
use crate::frames::{FrameTracker, Invocation};
use crate::module::{ModuleDescriptor, ModuleExpansion, ModuleRegistry};
use crate::prefix::PrefixTable;
use crate::registry::{RegistrationId, TransformerRegistry};
use crate::search::{SearchList, SearchPath};
use crate::store::DefinitionStore;
use crate::unit::{LoaderId, Representation, UnitId, UnitKind};
use reweave_sdk::{TransformPhase, Transformer};
use std::sync::Arc;
use tracing::debug;

/// Approximate per-instance header size used by [`Engine::object_size`]
const OBJECT_HEADER_BYTES: u64 = 16;

/// Bytes one declared field contributes to [`Engine::object_size`]
const FIELD_SLOT_BYTES: u64 = 8;

/// The live code-redefinition engine
pub struct Engine {
    config: EngineConfig,
    store: Arc<DefinitionStore>,
    registry: Arc<TransformerRegistry>,
    coordinator: RedefinitionCoordinator,
    modules: ModuleRegistry,
    search: SearchPath,
    prefixes: PrefixTable,
    tracker: Arc<FrameTracker>,
}

impl Engine {
    /// Create an engine with the given capabilities
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(DefinitionStore::new());
        let registry = Arc::new(TransformerRegistry::new());
        let coordinator = RedefinitionCoordinator::new(
            store.clone(),
            registry.clone(),
            config.can_redefine,
            config.can_retransform,
        );
        Self {
            config,
            store,
            registry,
            coordinator,
            modules: ModuleRegistry::new(),
            search: SearchPath::new(),
            prefixes: PrefixTable::new(),
            tracker: Arc::new(FrameTracker::new()),
        }
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Whether `redefine` batches are accepted. Stable for this engine's
    /// lifetime; never errors.
    pub fn supports_redefine(&self) -> bool {
        self.config.can_redefine
    }

    /// Whether `retransform` batches are accepted. Stable for this engine's
    /// lifetime; never errors.
    pub fn supports_retransform(&self) -> bool {
        self.config.can_retransform
    }

    /// Whether native-symbol prefixes may be set
    pub fn supports_native_prefix(&self) -> bool {
        self.config.can_set_native_prefix
    }

    // ========================================================================
    // Transformers
    // ========================================================================

    /// Register a transformer.
    ///
    /// # Errors
    /// `InvalidArgument` for a transformer with an empty name;
    /// `UnsupportedCapability` when `can_retransform` is requested on an
    /// engine configured without retransformation.
    pub fn add_transformer(
        &self,
        transformer: Arc<dyn Transformer>,
        can_retransform: bool,
    ) -> EngineResult<RegistrationId> {
        if transformer.name().is_empty() {
            return Err(EngineError::InvalidArgument(
                "transformer name must not be empty".to_string(),
            ));
        }
        if can_retransform && !self.config.can_retransform {
            return Err(EngineError::UnsupportedCapability("retransform"));
        }
        Ok(self.registry.register(transformer, can_retransform))
    }

    /// Remove the most-recently-added registration of `transformer`.
    ///
    /// Returns whether a registration was found. The removed registration's
    /// native prefix, if any, is forgotten with it.
    pub fn remove_transformer(&self, transformer: &Arc<dyn Transformer>) -> bool {
        match self.registry.unregister(transformer) {
            Some(id) => {
                self.prefixes.forget(id);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Define a unit from `bytes` at first load.
    ///
    /// The bytes are validated, the transformer chain runs over them, and
    /// the chain output (validated again if it differs) becomes the active
    /// representation; `bytes` is kept as the immutable initial baseline.
    ///
    /// # Errors
    /// `MalformedDefinition`/`IdentityMismatch` for bad input or bad chain
    /// output, `DuplicateDefinition` if the unit was already loaded.
    pub fn load_unit(
        &self,
        name: impl Into<String>,
        loader: LoaderId,
        bytes: Vec<u8>,
    ) -> EngineResult<UnitId> {
        let unit = UnitId::new(name, loader);
        validate_definition(&unit, &bytes)?;

        let outcome = self.registry.apply_chain(
            &unit.name,
            unit.loader,
            TransformPhase::InitialLoad,
            &bytes,
            &Default::default(),
        );
        if outcome.bytes != bytes {
            validate_definition(&unit, &outcome.bytes)?;
        }

        self.store.record_initial(
            unit.clone(),
            UnitKind::Class,
            bytes,
            outcome.bytes,
            outcome.recordings,
        )?;
        debug!(unit = %unit, "unit loaded");
        Ok(unit)
    }

    /// Register an array or primitive shape.
    ///
    /// Built-ins carry no byte representation and are never modifiable.
    ///
    /// # Errors
    /// `InvalidArgument` when `kind` is `Class`; `DuplicateDefinition` if
    /// already registered.
    pub fn register_builtin(
        &self,
        name: impl Into<String>,
        loader: LoaderId,
        kind: UnitKind,
    ) -> EngineResult<UnitId> {
        if kind.is_modifiable() {
            return Err(EngineError::InvalidArgument(
                "built-in units must be arrays or primitives".to_string(),
            ));
        }
        let unit = UnitId::new(name, loader);
        self.store
            .record_initial(unit.clone(), kind, Vec::new(), Vec::new(), Default::default())?;
        Ok(unit)
    }

    /// Find a loaded unit by name, falling back to the search paths.
    ///
    /// A store hit records `initiating_loader` as an initiator. On a miss,
    /// the bootstrap and system lists are probed in order; a located image
    /// is loaded under the matching list's loader.
    pub fn find_unit(&self, name: &str, initiating_loader: LoaderId) -> EngineResult<UnitId> {
        if let Some(unit) = self
            .store
            .all_units()
            .into_iter()
            .find(|u| u.name == name)
        {
            self.store.record_initiation(&unit, initiating_loader)?;
            return Ok(unit);
        }

        let (list, path) = self
            .search
            .locate_entry(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        let bytes =
            std::fs::read(&path).map_err(|_| EngineError::NotFound(name.to_string()))?;
        let loader = match list {
            SearchList::Bootstrap => LoaderId::BOOTSTRAP,
            SearchList::System => LoaderId::SYSTEM,
        };
        let unit = self.load_unit(name, loader, bytes)?;
        self.store.record_initiation(&unit, initiating_loader)?;
        Ok(unit)
    }

    /// Append a directory to one of the search lists
    pub fn append_search_path(
        &self,
        list: SearchList,
        dir: impl Into<std::path::PathBuf>,
    ) -> EngineResult<()> {
        self.search.append(list, dir)
    }

    // ========================================================================
    // Redefinition
    // ========================================================================

    /// Submit a redefinition batch. See
    /// [`RedefinitionCoordinator::redefine`] for the batch semantics.
    pub fn redefine(&self, batch: Vec<UnitDefinition>) -> EngineResult<BatchReport> {
        self.coordinator.redefine(batch)
    }

    /// Rerun the transformer chain for `units` from their initial bytes.
    /// See [`RedefinitionCoordinator::retransform`].
    pub fn retransform(&self, units: Vec<UnitId>) -> EngineResult<BatchReport> {
        self.coordinator.retransform(units)
    }

    /// Whether `unit` can ever be redefined.
    ///
    /// Always false for arrays, primitives and unknown units, regardless of
    /// the engine's capabilities.
    pub fn is_modifiable(&self, unit: &UnitId) -> bool {
        self.store
            .kind(unit)
            .map(UnitKind::is_modifiable)
            .unwrap_or(false)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// The unit's currently active representation
    pub fn current_representation(&self, unit: &UnitId) -> EngineResult<Representation> {
        self.store.current_active(unit)
    }

    /// The unit's immutable initial representation
    pub fn initial_representation(&self, unit: &UnitId) -> EngineResult<Representation> {
        self.store.initial(unit)
    }

    /// All loaded units, in unspecified order
    pub fn all_loaded_units(&self) -> Vec<UnitId> {
        self.store.all_units()
    }

    /// Units whose loading was initiated through `loader`
    pub fn initiated_units(&self, loader: LoaderId) -> Vec<UnitId> {
        self.store.initiated_by(loader)
    }

    /// Approximate per-instance size of a unit, derived from its active
    /// image: one object header plus one slot per declared field.
    pub fn object_size(&self, unit: &UnitId) -> EngineResult<u64> {
        let active = self.store.current_active(unit)?;
        let image = reweave_image::UnitImage::decode(active.bytes())
            .map_err(|e| EngineError::malformed(&unit.name, e))?;
        Ok(OBJECT_HEADER_BYTES + FIELD_SLOT_BYTES * image.fields.len() as u64)
    }

    /// Begin an invocation of `unit`, pinned to its current representation.
    ///
    /// The invocation keeps executing the pinned bytes even if the unit is
    /// redefined while it runs; only invocations begun after a commit see
    /// the new representation.
    pub fn begin_invocation(&self, unit: &UnitId) -> EngineResult<Invocation> {
        let repr = self.store.current_active(unit)?;
        Ok(self.tracker.begin(unit.clone(), repr))
    }

    /// Live invocations of `unit` across all representation versions
    pub fn live_frames(&self, unit: &UnitId) -> usize {
        self.tracker.live_frames(unit)
    }

    /// Live invocations of `unit` still running representation `version`
    pub fn live_frames_at(&self, unit: &UnitId, version: u64) -> usize {
        self.tracker.live_frames_at(unit, version)
    }

    // ========================================================================
    // Modules
    // ========================================================================

    /// Register a named module
    pub fn define_module(&self, descriptor: ModuleDescriptor) -> EngineResult<()> {
        self.modules.define(descriptor)
    }

    /// Snapshot of a named module's descriptor
    pub fn module_descriptor(&self, name: &str) -> EngineResult<ModuleDescriptor> {
        self.modules.descriptor(name)
    }

    /// Expand a module's visibility sets; `None` targets the unnamed
    /// module (always a successful no-op). See [`ModuleRegistry::expand`].
    pub fn expand_module(
        &self,
        module: Option<&str>,
        expansion: &ModuleExpansion,
    ) -> EngineResult<()> {
        self.modules.expand(module, expansion)
    }

    /// Whether a module can be expanded: named and known
    pub fn is_modifiable_module(&self, name: &str) -> bool {
        self.modules.is_modifiable(name)
    }

    // ========================================================================
    // Native prefixes
    // ========================================================================

    /// Set or clear the native prefix of a transformer registration.
    ///
    /// # Errors
    /// `UnsupportedCapability` when the engine was configured without
    /// native-prefix support; `InvalidArgument` for an empty prefix.
    pub fn set_native_prefix(
        &self,
        registration: RegistrationId,
        prefix: Option<&str>,
    ) -> EngineResult<()> {
        if !self.config.can_set_native_prefix {
            return Err(EngineError::UnsupportedCapability("native-prefix"));
        }
        self.prefixes.set(registration, prefix)
    }

    /// Fully composed native name for `symbol` under the current
    /// registrations
    pub fn compose_native_symbol(&self, symbol: &str) -> String {
        self.prefixes.compose(&self.registration_order(), symbol)
    }

    /// Retry a failed native binding of `symbol` against `lookup`,
    /// composing prefixes in registration order and skipping registrations
    /// that did not wrap this symbol.
    pub fn resolve_native_symbol<F>(&self, symbol: &str, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        self.prefixes
            .resolve(&self.registration_order(), symbol, lookup)
    }

    fn registration_order(&self) -> Vec<RegistrationId> {
        self.registry.snapshot().into_iter().map(|r| r.id).collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
