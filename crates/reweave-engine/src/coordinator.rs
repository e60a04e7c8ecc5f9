//! Redefinition coordinator
//!
//! Orchestrates batch swaps of active representations. A batch is validated
//! in full — modifiability, structure, identity, then the batch-wide
//! supertype graph — before anything installs; any failure aborts the whole
//! batch with no unit changed. Batches touching the same unit serialize on
//! per-unit locks taken in sorted order; disjoint batches run concurrently.

use crate::deps::TypeGraph;
use crate::error::{EngineError, EngineResult};
use crate::registry::TransformerRegistry;
use crate::store::DefinitionStore;
use crate::unit::UnitId;
use dashmap::DashMap;
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use reweave_image::{verify_image, UnitImage};
use reweave_sdk::TransformPhase;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Phases a batch moves through.
///
/// `Committed` and `Aborted` are terminal; an aborted batch leaves every
/// unit's active representation untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Submitted, not yet examined
    Pending,
    /// Per-unit and batch-wide validation in progress
    Validating,
    /// Validation passed; active representations being swapped
    Installing,
    /// All units installed
    Committed,
    /// Validation failed; nothing installed
    Aborted,
}

/// One unit's entry in a redefinition batch
#[derive(Debug, Clone)]
pub struct UnitDefinition {
    /// Unit whose active representation is replaced
    pub unit: UnitId,
    /// Replacement image bytes
    pub bytes: Vec<u8>,
}

impl UnitDefinition {
    /// Pair `unit` with its replacement bytes
    pub fn new(unit: UnitId, bytes: Vec<u8>) -> Self {
        Self { unit, bytes }
    }
}

/// Summary of a committed batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Terminal state (always `Committed` when returned through `Ok`)
    pub state: BatchState,
    /// Units the batch installed, in submission order
    pub units: Vec<UnitId>,
}

/// State machine governing batch swaps
pub struct RedefinitionCoordinator {
    store: Arc<DefinitionStore>,
    registry: Arc<TransformerRegistry>,
    can_redefine: bool,
    can_retransform: bool,
    unit_locks: DashMap<UnitId, Arc<Mutex<()>>>,
}

impl RedefinitionCoordinator {
    /// Create a coordinator over `store` and `registry`
    pub fn new(
        store: Arc<DefinitionStore>,
        registry: Arc<TransformerRegistry>,
        can_redefine: bool,
        can_retransform: bool,
    ) -> Self {
        Self {
            store,
            registry,
            can_redefine,
            can_retransform,
            unit_locks: DashMap::new(),
        }
    }

    /// Replace the active representations of the batch's units directly,
    /// bypassing the transformer chain.
    ///
    /// All-or-nothing: validation runs for the entire batch before any
    /// installation, and any failure aborts with no unit changed. An empty
    /// batch commits as a no-op. Existing instances and static state are
    /// not re-initialized; only invocations begun after the commit observe
    /// the new bytes.
    pub fn redefine(&self, batch: Vec<UnitDefinition>) -> EngineResult<BatchReport> {
        if !self.can_redefine {
            return Err(EngineError::UnsupportedCapability("redefine"));
        }
        if batch.is_empty() {
            return Ok(BatchReport {
                state: BatchState::Committed,
                units: Vec::new(),
            });
        }
        let units: Vec<UnitId> = batch.iter().map(|d| d.unit.clone()).collect();
        reject_duplicates(&units)?;

        let _guards = self.lock_units(&units);
        debug!(units = units.len(), "redefine batch validating");

        // Validating
        let mut installs = Vec::with_capacity(batch.len());
        let mut images = Vec::with_capacity(batch.len());
        for def in batch {
            self.check_modifiable(&def.unit)?;
            let image = validate_definition(&def.unit, &def.bytes)?;
            images.push(image);
            installs.push((def.unit, def.bytes));
        }
        self.check_batch_acyclic(&images)?;

        // Installing
        self.store.install_batch(installs)?;
        info!(units = units.len(), "redefine batch committed");

        Ok(BatchReport {
            state: BatchState::Committed,
            units,
        })
    }

    /// Recompute each unit's bytes by rerunning the transformer chain from
    /// its initial representation and install the results.
    ///
    /// Starting from the initial bytes — never the current active ones —
    /// makes retransformation reproducible no matter how often it runs.
    /// Same all-or-nothing semantics as [`RedefinitionCoordinator::redefine`].
    pub fn retransform(&self, units: Vec<UnitId>) -> EngineResult<BatchReport> {
        if !self.can_retransform {
            return Err(EngineError::UnsupportedCapability("retransform"));
        }
        if units.is_empty() {
            return Ok(BatchReport {
                state: BatchState::Committed,
                units,
            });
        }
        reject_duplicates(&units)?;

        let _guards = self.lock_units(&units);
        debug!(units = units.len(), "retransform batch validating");

        // Validating: recompute from the initial baseline, then validate
        // the recomputed bytes exactly like directly supplied ones
        let mut installs = Vec::with_capacity(units.len());
        let mut images = Vec::with_capacity(units.len());
        for unit in &units {
            self.check_modifiable(unit)?;
            let initial = self.store.initial(unit)?;
            let recorded = self.store.recordings(unit)?;
            let outcome = self.registry.apply_chain(
                &unit.name,
                unit.loader,
                TransformPhase::Retransform,
                initial.bytes(),
                &recorded,
            );
            let image = validate_definition(unit, &outcome.bytes)?;
            images.push(image);
            installs.push((unit.clone(), outcome.bytes));
        }
        self.check_batch_acyclic(&images)?;

        // Installing
        self.store.install_batch(installs)?;
        info!(units = units.len(), "retransform batch committed");

        Ok(BatchReport {
            state: BatchState::Committed,
            units,
        })
    }

    fn check_modifiable(&self, unit: &UnitId) -> EngineResult<()> {
        let kind = self.store.kind(unit)?;
        if !kind.is_modifiable() {
            return Err(EngineError::Unmodifiable(unit.to_string()));
        }
        Ok(())
    }

    /// Build the supertype graph of every known unit, overlay the batch's
    /// declared edges, and reject the batch if a cycle appears.
    fn check_batch_acyclic(&self, batch_images: &[UnitImage]) -> EngineResult<()> {
        let mut graph = TypeGraph::new();
        for unit in self.store.all_units() {
            graph.add_unit(unit.name.clone());
            if let Ok(active) = self.store.current_active(&unit) {
                if let Ok(image) = UnitImage::decode(active.bytes()) {
                    for supertype in image.declared_supertypes() {
                        graph.add_edge(unit.name.clone(), supertype);
                    }
                }
            }
        }
        for image in batch_images {
            graph.set_edges(image.name.clone(), image.declared_supertypes());
        }
        if let Some(cycle) = graph.find_cycle() {
            return Err(EngineError::CircularDependency(cycle.join(" -> ")));
        }
        Ok(())
    }

    /// Take the per-unit locks for a batch in sorted order.
    ///
    /// Sorted acquisition keeps two overlapping batches from deadlocking;
    /// holding the locks through validation and install serializes batches
    /// that touch the same unit (the later-committing batch wins as a total
    /// replacement).
    fn lock_units(&self, units: &[UnitId]) -> Vec<ArcMutexGuard<RawMutex, ()>> {
        let mut sorted: Vec<UnitId> = units.to_vec();
        sorted.sort();
        sorted.dedup();
        sorted
            .into_iter()
            .map(|unit| {
                // Clone out of the map first so its shard guard is released
                // before blocking on the unit lock.
                let lock = self
                    .unit_locks
                    .entry(unit)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                lock.lock_arc()
            })
            .collect()
    }
}

fn reject_duplicates(units: &[UnitId]) -> EngineResult<()> {
    let mut seen = FxHashSet::default();
    for unit in units {
        if !seen.insert(unit) {
            return Err(EngineError::InvalidArgument(format!(
                "unit {unit} appears twice in one batch"
            )));
        }
    }
    Ok(())
}

/// Decode, structurally verify, and identity-check one definition.
///
/// Shared by the first-load path and both batch operations.
pub(crate) fn validate_definition(unit: &UnitId, bytes: &[u8]) -> EngineResult<UnitImage> {
    let image = UnitImage::decode(bytes).map_err(|e| EngineError::malformed(&unit.name, e))?;
    verify_image(&image).map_err(|e| EngineError::unverifiable(&unit.name, e))?;
    if image.name != unit.name {
        return Err(EngineError::IdentityMismatch {
            expected: unit.name.clone(),
            declared: image.name,
        });
    }
    Ok(image)
}
