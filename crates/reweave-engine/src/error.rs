//! Engine error taxonomy

use reweave_image::{ImageError, VerifyError};

/// Errors reported by engine operations
///
/// Batch operations validate every unit before installing any; a variant
/// returned from `redefine` or `retransform` therefore implies that no
/// unit's active representation changed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Null/empty/foreign input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Target cannot be changed (arrays, primitives, policy-restricted)
    #[error("Unit {0} is not modifiable")]
    Unmodifiable(String),

    /// The engine was configured without the requested capability
    #[error("Capability not supported: {0}")]
    UnsupportedCapability(&'static str),

    /// Supplied bytes failed decoding or structural verification
    #[error("Malformed definition for {unit}: {reason}")]
    MalformedDefinition {
        /// Unit the bytes were submitted for
        unit: String,
        /// What the validator rejected
        reason: String,
    },

    /// Declared name in the bytes disagrees with the target unit
    #[error("Identity mismatch: definition declares {declared:?}, target is {expected:?}")]
    IdentityMismatch {
        /// Name of the unit being redefined
        expected: String,
        /// Name the submitted bytes declare
        declared: String,
    },

    /// The batch would introduce a circular type relationship
    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    /// An initial representation was already recorded for the unit
    #[error("Duplicate definition for {0}")]
    DuplicateDefinition(String),

    /// Unknown unit or module reference
    #[error("Not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Build a `MalformedDefinition` from an image decode error
    pub(crate) fn malformed(unit: &str, err: ImageError) -> Self {
        EngineError::MalformedDefinition {
            unit: unit.to_string(),
            reason: err.to_string(),
        }
    }

    /// Build a `MalformedDefinition` from a structural verification error
    pub(crate) fn unverifiable(unit: &str, err: VerifyError) -> Self {
        EngineError::MalformedDefinition {
            unit: unit.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Engine operation result
pub type EngineResult<T> = Result<T, EngineError>;
