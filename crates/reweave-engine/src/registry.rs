//! Transformer registry and chain application
//!
//! Registrations are kept in insertion order; the same transformer instance
//! may be registered multiple times and each registration participates
//! independently. Chain runs operate on a snapshot of the list, so
//! unregistering never disturbs a run already dispatched.

use crate::unit::LoaderId;
use parking_lot::RwLock;
use reweave_sdk::{TransformContext, TransformPhase, TransformResult, Transformer};
use rustc_hash::FxHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Handle identifying one registration.
///
/// Registering the same transformer twice yields two distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// One entry of the registry
#[derive(Clone)]
pub struct Registration {
    /// Registration handle
    pub id: RegistrationId,
    /// The registered transformer
    pub transformer: Arc<dyn Transformer>,
    /// Whether this registration participates in retransformation
    pub can_retransform: bool,
}

/// Output of one chain run
pub struct ChainOutcome {
    /// Final bytes after the whole chain
    pub bytes: Vec<u8>,
    /// Chain value recorded after each retransform-incapable registration
    /// that was actually invoked. Replayed verbatim on retransformation.
    pub recordings: FxHashMap<RegistrationId, Arc<[u8]>>,
}

/// Ordered collection of transformer registrations
pub struct TransformerRegistry {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl TransformerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a new registration.
    ///
    /// The same `Arc` may be registered repeatedly; each call appends an
    /// independent entry.
    pub fn register(
        &self,
        transformer: Arc<dyn Transformer>,
        can_retransform: bool,
    ) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            transformer,
            can_retransform,
        });
        id
    }

    /// Remove the most-recently-added registration holding the same
    /// transformer instance. Returns the removed registration's id, or
    /// `None` if no entry matched.
    ///
    /// Chain runs already dispatched keep their snapshot and are unaffected.
    pub fn unregister(&self, transformer: &Arc<dyn Transformer>) -> Option<RegistrationId> {
        let mut registrations = self.registrations.write();
        let index = registrations
            .iter()
            .rposition(|r| Arc::ptr_eq(&r.transformer, transformer))?;
        Some(registrations.remove(index).id)
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// True when no transformer is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Snapshot of the registration list in registration order
    pub fn snapshot(&self) -> Vec<Registration> {
        self.registrations.read().clone()
    }

    /// Run the chain over `initial` for the given unit.
    ///
    /// Each registration is fed the previous link's output. A registration
    /// that fails (error result or panic) is skipped — its output is its
    /// input — and the chain continues.
    ///
    /// During retransformation (`phase == Retransform`), registrations with
    /// `can_retransform == false` are not invoked: their entry in `recorded`
    /// replays verbatim as the next chain value (no entry means they never
    /// ran, contributing nothing). Capable registrations are re-invoked.
    pub fn apply_chain(
        &self,
        unit_name: &str,
        loader: LoaderId,
        phase: TransformPhase,
        initial: &[u8],
        recorded: &FxHashMap<RegistrationId, Arc<[u8]>>,
    ) -> ChainOutcome {
        let ctx = TransformContext {
            unit_name,
            loader: loader.0,
            phase,
        };

        let mut current: Vec<u8> = initial.to_vec();
        let mut recordings: FxHashMap<RegistrationId, Arc<[u8]>> = FxHashMap::default();

        for registration in self.snapshot() {
            if phase == TransformPhase::Retransform && !registration.can_retransform {
                if let Some(bytes) = recorded.get(&registration.id) {
                    current = bytes.to_vec();
                }
                continue;
            }

            let transformer = registration.transformer.clone();
            let input = current.clone();
            let result = catch_unwind(AssertUnwindSafe(|| transformer.transform(&ctx, &input)));

            match result {
                Ok(TransformResult::Transformed(bytes)) => current = bytes,
                Ok(TransformResult::Unchanged) => {}
                Ok(TransformResult::Failed(err)) => {
                    warn!(
                        transformer = transformer.name(),
                        unit = unit_name,
                        error = %err,
                        "transformer failed, continuing chain"
                    );
                }
                Err(_) => {
                    warn!(
                        transformer = transformer.name(),
                        unit = unit_name,
                        "transformer panicked, continuing chain"
                    );
                }
            }

            if !registration.can_retransform {
                recordings.insert(registration.id, Arc::from(current.as_slice()));
            }
        }

        ChainOutcome {
            bytes: current,
            recordings,
        }
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
