//! Native-symbol prefixes
//!
//! A transformer that wraps native methods renames the underlying native
//! symbol with its prefix. When binding a symbol fails, resolution retries
//! with the registered prefixes composed in registration order — the
//! earliest-registered wrapper innermost — skipping any registration whose
//! prefix does not lead to a binding.

use crate::error::{EngineError, EngineResult};
use crate::registry::RegistrationId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Per-registration native prefix table
pub struct PrefixTable {
    prefixes: RwLock<FxHashMap<RegistrationId, String>>,
}

impl PrefixTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            prefixes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Set or clear the prefix for one registration.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty prefix string.
    pub fn set(&self, registration: RegistrationId, prefix: Option<&str>) -> EngineResult<()> {
        match prefix {
            Some("") => Err(EngineError::InvalidArgument(
                "native prefix must not be empty".to_string(),
            )),
            Some(prefix) => {
                self.prefixes
                    .write()
                    .insert(registration, prefix.to_string());
                Ok(())
            }
            None => {
                self.prefixes.write().remove(&registration);
                Ok(())
            }
        }
    }

    /// The prefix currently set for a registration
    pub fn get(&self, registration: RegistrationId) -> Option<String> {
        self.prefixes.read().get(&registration).cloned()
    }

    /// Drop a registration's prefix (used when it is unregistered)
    pub fn forget(&self, registration: RegistrationId) {
        self.prefixes.write().remove(&registration);
    }

    /// The fully composed symbol name with every prefixed registration
    /// applied in registration order (earliest innermost).
    pub fn compose(&self, ordered: &[RegistrationId], symbol: &str) -> String {
        let prefixes = self.ordered_prefixes(ordered);
        let mut name = symbol.to_string();
        for prefix in prefixes {
            name = format!("{prefix}{name}");
        }
        name
    }

    /// Retry a failed binding of `symbol`.
    ///
    /// Tries prefix compositions in registration order, preferring the
    /// deepest composition and skipping registrations whose prefix does not
    /// lead to a binding. Returns the first name `lookup` accepts.
    pub fn resolve<F>(
        &self,
        ordered: &[RegistrationId],
        symbol: &str,
        lookup: F,
    ) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        let prefixes = self.ordered_prefixes(ordered);
        Self::search(&prefixes, symbol.to_string(), &lookup)
    }

    fn search<F>(prefixes: &[String], current: String, lookup: &F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        match prefixes.split_first() {
            None => lookup(&current).then_some(current),
            Some((prefix, rest)) => {
                // With this wrapper applied first, without it second
                let wrapped = format!("{prefix}{current}");
                Self::search(rest, wrapped, lookup)
                    .or_else(|| Self::search(rest, current, lookup))
            }
        }
    }

    fn ordered_prefixes(&self, ordered: &[RegistrationId]) -> Vec<String> {
        let prefixes = self.prefixes.read();
        ordered
            .iter()
            .filter_map(|id| prefixes.get(id).cloned())
            .collect()
    }
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self::new()
    }
}
