//! Loadable unit identity and immutable representations

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Identity of a defining or initiating loader.
///
/// Loader 0 is the bootstrap loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

impl LoaderId {
    /// The bootstrap loader
    pub const BOOTSTRAP: LoaderId = LoaderId(0);
    /// The system loader (owns the system search path)
    pub const SYSTEM: LoaderId = LoaderId(1);
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

/// What kind of unit an identity refers to.
///
/// Only `Class` units are ever modifiable; arrays and primitives are
/// synthesized by the runtime and have no byte representation to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// An ordinary, redefinable unit
    Class,
    /// An array shape (unmodifiable)
    Array,
    /// A primitive built-in (unmodifiable)
    Primitive,
}

impl UnitKind {
    /// Whether units of this kind can ever be redefined
    pub fn is_modifiable(self) -> bool {
        matches!(self, UnitKind::Class)
    }
}

/// Stable identity of one loadable unit: name plus defining loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId {
    /// Dotted unit name (e.g. "app.Handler")
    pub name: String,
    /// Defining loader
    pub loader: LoaderId,
}

impl UnitId {
    /// Create an identity for `name` defined by `loader`
    pub fn new(name: impl Into<String>, loader: LoaderId) -> Self {
        Self {
            name: name.into(),
            loader,
        }
    }

    /// Identity under the bootstrap loader
    pub fn bootstrap(name: impl Into<String>) -> Self {
        Self::new(name, LoaderId::BOOTSTRAP)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.loader)
    }
}

/// Immutable byte-exact snapshot of a unit's executable form.
///
/// Cloning is cheap (Arc); the bytes are never mutated in place —
/// replacement produces a new `Representation` with a higher version.
#[derive(Clone)]
pub struct Representation {
    bytes: Arc<[u8]>,
    version: u64,
}

impl Representation {
    /// Wrap `bytes` as version `version` of some unit
    pub fn new(bytes: impl Into<Arc<[u8]>>, version: u64) -> Self {
        Self {
            bytes: bytes.into(),
            version,
        }
    }

    /// The snapshot bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Snapshot length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length snapshot
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Per-unit version of this snapshot; the initial representation is
    /// version 0 and every successful install increments it
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Hex-encoded SHA-256 digest of the snapshot bytes
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    /// Byte equality, ignoring versions
    pub fn same_bytes(&self, other: &Representation) -> bool {
        self.bytes == other.bytes
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation")
            .field("version", &self.version)
            .field("len", &self.bytes.len())
            .finish()
    }
}
