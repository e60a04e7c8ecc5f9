//! Active-frame compatibility
//!
//! An execution that began under one representation must finish under it.
//! [`Invocation`] pins the representation it started with (an Arc-backed
//! snapshot, immune to later installs); the tracker counts live invocations
//! per unit and per version so callers can observe old versions retiring.
//! Installs never interrupt or migrate a live invocation.

use crate::unit::{Representation, UnitId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Counts live invocations per (unit, representation version)
#[derive(Default)]
pub struct FrameTracker {
    counts: Mutex<FxHashMap<(UnitId, u64), usize>>,
}

impl FrameTracker {
    /// Create a tracker with no live frames
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an invocation of `unit` pinned to `repr`.
    ///
    /// The returned [`Invocation`] keeps reading `repr`'s bytes for its
    /// whole lifetime, regardless of any install committed meanwhile.
    pub fn begin(self: &Arc<Self>, unit: UnitId, repr: Representation) -> Invocation {
        let key = (unit.clone(), repr.version());
        *self.counts.lock().entry(key).or_insert(0) += 1;
        Invocation {
            unit,
            repr,
            tracker: Arc::clone(self),
        }
    }

    /// Live invocations of `unit` across all versions
    pub fn live_frames(&self, unit: &UnitId) -> usize {
        self.counts
            .lock()
            .iter()
            .filter(|((u, _), _)| u == unit)
            .map(|(_, count)| *count)
            .sum()
    }

    /// Live invocations of `unit` still running version `version`
    pub fn live_frames_at(&self, unit: &UnitId, version: u64) -> usize {
        self.counts
            .lock()
            .get(&(unit.clone(), version))
            .copied()
            .unwrap_or(0)
    }

    fn end(&self, unit: &UnitId, version: u64) {
        let mut counts = self.counts.lock();
        let key = (unit.clone(), version);
        if let Some(count) = counts.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&key);
            }
        }
    }
}

/// One in-flight execution of a unit, pinned to the representation that was
/// active when it began
pub struct Invocation {
    unit: UnitId,
    repr: Representation,
    tracker: Arc<FrameTracker>,
}

impl Invocation {
    /// The unit being executed
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    /// The pinned representation; stable for this invocation's lifetime
    pub fn representation(&self) -> &Representation {
        &self.repr
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        self.tracker.end(&self.unit, self.repr.version());
    }
}
