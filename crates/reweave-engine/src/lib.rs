//! Reweave Redefinition Engine
//!
//! This crate implements live code replacement for loadable units:
//! - **Definition store**: initial and active representations per unit
//!   (`store` module)
//! - **Transformer registry**: ordered chain application with failure
//!   isolation (`registry` module)
//! - **Redefinition coordinator**: all-or-nothing batch swaps
//!   (`coordinator` module)
//! - **Active-frame compatibility**: invocations pinned to the
//!   representation they started under (`frames` module)
//! - **Module visibility**: monotonic expansion of module relations
//!   (`module` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use reweave_engine::{Engine, EngineConfig, LoaderId, UnitDefinition};
//! use reweave_image::UnitImage;
//!
//! let engine = Engine::new(EngineConfig::default());
//! let image = UnitImage::new("app.Main");
//! let unit = engine.load_unit("app.Main", LoaderId::BOOTSTRAP, image.encode())?;
//!
//! // Replace the active representation; in-flight invocations keep the
//! // bytes they started with.
//! engine.redefine(vec![UnitDefinition::new(unit, image.encode())])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Engine configuration and capabilities
pub mod config;

/// Batch redefinition and retransformation
pub mod coordinator;

/// Supertype graph used for batch validation
pub mod deps;

/// Engine facade
pub mod engine;

/// Error taxonomy
pub mod error;

/// Active-frame tracking
pub mod frames;

/// Module visibility expansion
pub mod module;

/// Native-symbol prefix composition
pub mod prefix;

/// Transformer registry and chain application
pub mod registry;

/// Bootstrap/system search paths
pub mod search;

/// Definition store
pub mod store;

/// Unit identity and representations
pub mod unit;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::EngineConfig;
pub use coordinator::{BatchReport, BatchState, RedefinitionCoordinator, UnitDefinition};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use frames::{FrameTracker, Invocation};
pub use module::{ModuleDescriptor, ModuleExpansion, ModuleRegistry};
pub use registry::{RegistrationId, TransformerRegistry};
pub use search::{SearchList, SearchPath};
pub use store::DefinitionStore;
pub use unit::{LoaderId, Representation, UnitId, UnitKind};
