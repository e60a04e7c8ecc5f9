//! Transformer error types

/// Errors a transformer may report from its transform hook.
///
/// A failed transformer never aborts the chain it runs in; the engine logs
/// the failure and continues with the transformer's input unchanged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    /// The transformer could not parse the bytes it was given
    #[error("Unreadable input: {0}")]
    UnreadableInput(String),

    /// The transformer recognized the unit but refused to touch it
    #[error("Rejected unit {unit}: {reason}")]
    Rejected {
        /// Unit name the transformer rejected
        unit: String,
        /// Why it was rejected
        reason: String,
    },

    /// Transformer-internal failure
    #[error("Internal transformer error: {0}")]
    Internal(String),
}
