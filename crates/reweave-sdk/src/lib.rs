//! Reweave SDK - Lightweight SDK for writing transformers
//!
//! This crate provides the minimal types and traits needed to write Reweave
//! transformers without depending on the full reweave-engine.
//!
//! # Example
//!
//! ```ignore
//! use reweave_sdk::{TransformContext, TransformResult, Transformer};
//!
//! struct Uppercaser;
//!
//! impl Transformer for Uppercaser {
//!     fn name(&self) -> &str {
//!         "uppercaser"
//!     }
//!
//!     fn transform(&self, _ctx: &TransformContext<'_>, bytes: &[u8]) -> TransformResult {
//!         TransformResult::Transformed(bytes.to_ascii_uppercase())
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod error;
mod transformer;

pub use error::TransformError;
pub use transformer::{TransformContext, TransformPhase, TransformResult, Transformer};
