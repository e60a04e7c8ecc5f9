//! Engine configuration

use serde::{Deserialize, Serialize};

/// Capabilities the engine is created with.
///
/// Fixed for the engine's lifetime; the capability queries on
/// [`crate::Engine`] report these values and never change their answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether `redefine` batches are accepted
    pub can_redefine: bool,
    /// Whether `retransform` batches are accepted
    pub can_retransform: bool,
    /// Whether transformers may set native-symbol prefixes
    pub can_set_native_prefix: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            can_redefine: true,
            can_retransform: true,
            can_set_native_prefix: true,
        }
    }
}
