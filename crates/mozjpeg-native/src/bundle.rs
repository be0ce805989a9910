//! Sources of bundled library resources
//!
//! A bundle maps canonical resource paths (`/native_mozjpeg/...`) to bytes.
//! Libraries can ship as a directory tree next to the executable or be
//! compiled in with `include_bytes!`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Read-only store of bundled resources
pub trait ResourceBundle: Send + Sync {
    /// Open a resource for reading, or `None` if the bundle doesn't have it.
    fn open(&self, resource_path: &str) -> Option<Box<dyn Read + Send>>;

    fn contains(&self, resource_path: &str) -> bool {
        self.open(resource_path).is_some()
    }
}

/// Resources laid out as files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `resources/` next to the running executable
    pub fn beside_executable() -> Self {
        let root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
            .unwrap_or_else(|| PathBuf::from("resources"));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a resource. Empty and `..` segments are dropped.
    pub fn resolve(&self, resource_path: &str) -> PathBuf {
        resource_path
            .split('/')
            .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
            .fold(self.root.clone(), |acc, seg| acc.join(seg))
    }
}

impl ResourceBundle for DirectoryBundle {
    fn open(&self, resource_path: &str) -> Option<Box<dyn Read + Send>> {
        let path = self.resolve(resource_path);
        if !path.is_file() {
            return None;
        }
        File::open(&path)
            .ok()
            .map(|file| Box::new(file) as Box<dyn Read + Send>)
    }
}

/// Resources held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBundle {
    resources: HashMap<String, &'static [u8]>,
    owned: HashMap<String, Vec<u8>>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource compiled into the binary.
    pub fn with_static(mut self, resource_path: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.resources.insert(resource_path.into(), bytes);
        self
    }

    /// Add or replace a resource.
    pub fn insert(&mut self, resource_path: impl Into<String>, bytes: Vec<u8>) {
        let path = resource_path.into();
        self.resources.remove(&path);
        self.owned.insert(path, bytes);
    }

    pub fn len(&self) -> usize {
        self.resources.len() + self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceBundle for MemoryBundle {
    fn open(&self, resource_path: &str) -> Option<Box<dyn Read + Send>> {
        if let Some(bytes) = self.resources.get(resource_path) {
            return Some(Box::new(Cursor::new(*bytes)));
        }
        self.owned
            .get(resource_path)
            .map(|bytes| Box::new(Cursor::new(bytes.clone())) as Box<dyn Read + Send>)
    }
}
