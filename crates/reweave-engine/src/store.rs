//! Definition store
//!
//! Maps each loadable unit to its immutable initial representation, its
//! currently active representation, the recorded chain outputs of
//! retransform-incapable registrations, and the loaders that initiated it.
//!
//! Multi-unit installs take the store-wide commit lock exclusively while
//! readers of `current_active` hold it shared, so a concurrent reader
//! observes either none or all of a batch — never a partial installation.

use crate::error::{EngineError, EngineResult};
use crate::registry::RegistrationId;
use crate::unit::{LoaderId, Representation, UnitId, UnitKind};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

struct UnitEntry {
    kind: UnitKind,
    /// Fixed at first load, never replaced
    initial: Representation,
    /// Swapped atomically by installs
    active: RwLock<Representation>,
    /// Chain value after each retransform-incapable registration, captured
    /// when the registration last actually ran
    recordings: Mutex<FxHashMap<RegistrationId, Arc<[u8]>>>,
    /// Loaders that initiated loading or lookup of this unit
    initiators: Mutex<FxHashSet<LoaderId>>,
}

/// Durable mapping from unit identity to its representations
pub struct DefinitionStore {
    units: DashMap<UnitId, Arc<UnitEntry>>,
    commit_lock: RwLock<()>,
}

impl DefinitionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            units: DashMap::new(),
            commit_lock: RwLock::new(()),
        }
    }

    /// Record a unit's first load.
    ///
    /// `initial` is the pre-transformation baseline and is immutable from
    /// here on; `active` is the transformer chain's output for the first
    /// load (equal to `initial` when no transformer changed anything).
    ///
    /// # Errors
    /// `DuplicateDefinition` if the unit was already recorded.
    pub fn record_initial(
        &self,
        unit: UnitId,
        kind: UnitKind,
        initial: Vec<u8>,
        active: Vec<u8>,
        recordings: FxHashMap<RegistrationId, Arc<[u8]>>,
    ) -> EngineResult<()> {
        use dashmap::mapref::entry::Entry;

        let defining_loader = unit.loader;
        match self.units.entry(unit) {
            Entry::Occupied(occupied) => {
                Err(EngineError::DuplicateDefinition(occupied.key().to_string()))
            }
            Entry::Vacant(vacant) => {
                let initial = Representation::new(initial, 0);
                let active = if active.as_slice() == initial.bytes() {
                    initial.clone()
                } else {
                    Representation::new(active, 1)
                };
                let mut initiators = FxHashSet::default();
                initiators.insert(defining_loader);
                vacant.insert(Arc::new(UnitEntry {
                    kind,
                    initial,
                    active: RwLock::new(active),
                    recordings: Mutex::new(recordings),
                    initiators: Mutex::new(initiators),
                }));
                Ok(())
            }
        }
    }

    /// Whether the unit is known to the store
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.units.contains_key(unit)
    }

    /// Kind of a known unit
    pub fn kind(&self, unit: &UnitId) -> EngineResult<UnitKind> {
        self.entry(unit).map(|e| e.kind)
    }

    /// The currently active representation of a unit.
    ///
    /// Linearizable with respect to batch installs: taken under the shared
    /// side of the commit lock.
    pub fn current_active(&self, unit: &UnitId) -> EngineResult<Representation> {
        let _guard = self.commit_lock.read();
        self.entry(unit).map(|e| e.active.read().clone())
    }

    /// The immutable initial representation of a unit
    pub fn initial(&self, unit: &UnitId) -> EngineResult<Representation> {
        self.entry(unit).map(|e| e.initial.clone())
    }

    /// Recorded incapable-registration outputs for a unit
    pub fn recordings(
        &self,
        unit: &UnitId,
    ) -> EngineResult<FxHashMap<RegistrationId, Arc<[u8]>>> {
        self.entry(unit).map(|e| e.recordings.lock().clone())
    }

    /// Note that `loader` initiated loading or lookup of `unit`
    pub fn record_initiation(&self, unit: &UnitId, loader: LoaderId) -> EngineResult<()> {
        self.entry(unit).map(|e| {
            e.initiators.lock().insert(loader);
        })
    }

    /// All units the store knows, in unspecified order
    pub fn all_units(&self) -> Vec<UnitId> {
        self.units.iter().map(|e| e.key().clone()).collect()
    }

    /// Units whose loading was initiated through `loader`
    pub fn initiated_by(&self, loader: LoaderId) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|e| e.value().initiators.lock().contains(&loader))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Install new active representations for a validated batch.
    ///
    /// Called only by the coordinator, after every unit passed validation.
    /// Holds the commit lock exclusively for the duration of the swap so the
    /// whole batch becomes visible atomically.
    pub(crate) fn install_batch(&self, installs: Vec<(UnitId, Vec<u8>)>) -> EngineResult<()> {
        // Resolve entries before taking the commit lock; validation already
        // proved they exist, but a NotFound here still aborts cleanly.
        let mut resolved = Vec::with_capacity(installs.len());
        for (unit, bytes) in installs {
            let entry = self.entry(&unit)?;
            resolved.push((entry, bytes));
        }

        let _guard = self.commit_lock.write();
        for (entry, bytes) in resolved {
            let mut active = entry.active.write();
            let next_version = active.version() + 1;
            *active = Representation::new(bytes, next_version);
        }
        Ok(())
    }

    fn entry(&self, unit: &UnitId) -> EngineResult<Arc<UnitEntry>> {
        self.units
            .get(unit)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::NotFound(unit.to_string()))
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}
