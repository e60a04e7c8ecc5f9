//! Transformer trait — the plug-in surface of the redefinition engine
//!
//! Transformers are invoked in registration order whenever a unit is first
//! loaded, and again during retransformation if they were registered as
//! retransform-capable. They receive the previous participant's output and
//! produce the next link of the chain.

use crate::error::TransformError;

// ============================================================================
// Transform Context
// ============================================================================

/// Why the transformer chain is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPhase {
    /// The unit is being defined for the first time
    InitialLoad,
    /// The unit is being retransformed from its initial bytes
    Retransform,
}

/// Read-only context handed to every transform call.
///
/// Borrows are tied to the engine's call frame; transformers must not retain
/// them beyond the call.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Dotted name of the unit being transformed (e.g. "app.Handler")
    pub unit_name: &'a str,
    /// Identity of the loader that defined the unit (0 is the bootstrap loader)
    pub loader: u64,
    /// Phase this chain run belongs to
    pub phase: TransformPhase,
}

// ============================================================================
// Transform Result
// ============================================================================

/// Outcome of a single transform call.
#[derive(Debug, Clone)]
pub enum TransformResult {
    /// The transformer declined to change the bytes; the chain continues
    /// with its input.
    Unchanged,
    /// New bytes replacing the transformer's input for the rest of the chain
    Transformed(Vec<u8>),
    /// The transformer failed. Treated exactly like [`TransformResult::Unchanged`]
    /// by the chain, but the failure is reported to the engine's log.
    Failed(TransformError),
}

impl TransformResult {
    /// True if this result carries replacement bytes
    pub fn is_transformed(&self) -> bool {
        matches!(self, TransformResult::Transformed(_))
    }
}

// ============================================================================
// Transformer
// ============================================================================

/// A registered participant in the transformation chain.
///
/// # Thread Safety
///
/// Transformers are shared across concurrent chain runs and must be
/// `Send + Sync`. The same instance may be registered more than once; each
/// registration participates independently.
///
/// # Panics
///
/// A panicking transform call is caught by the engine and treated as
/// [`TransformResult::Unchanged`]; it never poisons the chain.
pub trait Transformer: Send + Sync {
    /// Stable human-readable name, used in logs and diagnostics
    fn name(&self) -> &str;

    /// Produce the next link of the chain from `bytes`.
    ///
    /// # Arguments
    /// * `ctx` - Unit identity and phase for this chain run
    /// * `bytes` - Output of the previous participant (or the unit's
    ///   baseline bytes for the first)
    fn transform(&self, ctx: &TransformContext<'_>, bytes: &[u8]) -> TransformResult;

    /// Prefix this transformer applies when wrapping native symbols.
    ///
    /// Returning `Some` declares that methods this transformer wraps have
    /// their native implementations renamed with this prefix. Most
    /// transformers never wrap natives and keep the default.
    fn native_prefix(&self) -> Option<&str> {
        None
    }
}
