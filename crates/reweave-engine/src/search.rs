//! Bootstrap and system search paths
//!
//! Two ordered directory lists consulted when a unit cannot be found by
//! name through the store. Entries are only ever appended — never reordered
//! or removed — and probing follows append order, bootstrap list first.

use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::path::PathBuf;

/// File extension of stored unit images
pub const IMAGE_EXTENSION: &str = "rwu";

/// Which of the two search lists an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchList {
    /// Consulted first
    Bootstrap,
    /// Consulted after the bootstrap list
    System,
}

/// Append-only search path pair
pub struct SearchPath {
    bootstrap: RwLock<Vec<PathBuf>>,
    system: RwLock<Vec<PathBuf>>,
}

impl SearchPath {
    /// Create empty search lists
    pub fn new() -> Self {
        Self {
            bootstrap: RwLock::new(Vec::new()),
            system: RwLock::new(Vec::new()),
        }
    }

    /// Append a directory to one of the lists.
    ///
    /// # Errors
    /// `InvalidArgument` if `dir` is not an existing directory.
    pub fn append(&self, list: SearchList, dir: impl Into<PathBuf>) -> EngineResult<()> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(EngineError::InvalidArgument(format!(
                "search path entry is not a directory: {}",
                dir.display()
            )));
        }
        match list {
            SearchList::Bootstrap => self.bootstrap.write().push(dir),
            SearchList::System => self.system.write().push(dir),
        }
        Ok(())
    }

    /// Number of entries across both lists
    pub fn len(&self) -> usize {
        self.bootstrap.read().len() + self.system.read().len()
    }

    /// True when no directory has been appended
    pub fn is_empty(&self) -> bool {
        self.bootstrap.read().is_empty() && self.system.read().is_empty()
    }

    /// Probe for `<dir>/<name>.rwu`, bootstrap entries first, each list in
    /// append order. Returns the first existing path.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.locate_entry(name).map(|(_, path)| path)
    }

    /// Like [`SearchPath::locate`], also reporting which list matched
    pub fn locate_entry(&self, name: &str) -> Option<(SearchList, PathBuf)> {
        let file_name = format!("{name}.{IMAGE_EXTENSION}");
        self.probe(&self.bootstrap.read(), &file_name)
            .map(|path| (SearchList::Bootstrap, path))
            .or_else(|| {
                self.probe(&self.system.read(), &file_name)
                    .map(|path| (SearchList::System, path))
            })
    }

    fn probe(&self, dirs: &[PathBuf], file_name: &str) -> Option<PathBuf> {
        dirs.iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
    }
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::new()
    }
}

/// File name an image for `name` is stored under
pub fn image_file_name(name: &str) -> String {
    format!("{name}.{IMAGE_EXTENSION}")
}
