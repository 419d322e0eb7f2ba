//! Resource location
//!
//! A `ResourceLocator` resolves a logical resource name to a byte stream.
//! The same seam is used on both sides of the lane: the deployment
//! coordinator reads local resources through it at build time, and a
//! deployed scoring unit reads its model fragments through it at runtime.
//!
//! Lookup has exactly one failure channel: `try_open` returns `None`
//! whether the resource is missing or unreadable, since the environments
//! this runs in do not report the difference consistently.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;

/// Resolves logical resource names to byte streams.
pub trait ResourceLocator: Send + Sync {
    /// Open the named resource for reading, or `None` if it cannot be
    /// opened for any reason.
    fn try_open(&self, name: &str) -> Option<Box<dyn Read + Send>>;
}

/// Locator over a directory on the local filesystem.
///
/// Resource names are joined to the root; nested names like
/// `models/gbm.tar.gz` resolve to subdirectories.
pub struct DirLocator {
    root: PathBuf,
}

impl DirLocator {
    /// Create a locator rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLocator for DirLocator {
    fn try_open(&self, name: &str) -> Option<Box<dyn Read + Send>> {
        let path = self.root.join(name);
        File::open(path)
            .ok()
            .map(|f| Box::new(f) as Box<dyn Read + Send>)
    }
}

/// Locator over an owned in-memory map of resources.
///
/// Used by tests and by the mock engine's view of uploaded bundle entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocator {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryLocator {
    /// Create an empty locator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named resource, replacing any existing one.
    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), bytes.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    /// Number of resources held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no resources are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for MemoryLocator {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl ResourceLocator for MemoryLocator {
    fn try_open(&self, name: &str) -> Option<Box<dyn Read + Send>> {
        self.entries
            .get(name)
            .cloned()
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
    }
}
