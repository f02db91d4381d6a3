//! Installed top-level classes, by path

use std::collections::BTreeMap;
use std::sync::Arc;

use super::builder::ClassDescription;
use super::definition::ClassDef;

#[derive(Debug)]
struct ClassEntry {
    description: ClassDescription,
    current: Arc<ClassDef>,
}

/// Registry of loaded top-level classes.
///
/// Keeps the description each class was last built from, so dependents can
/// be rebuilt when a base reloads.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    entries: BTreeMap<String, ClassEntry>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the definition at `def.path()`
    pub fn install(&mut self, description: ClassDescription, def: Arc<ClassDef>) {
        self.entries.insert(
            def.path().to_string(),
            ClassEntry {
                description,
                current: def,
            },
        );
    }

    /// Current definition at `path`
    pub fn get(&self, path: &str) -> Option<&Arc<ClassDef>> {
        self.entries.get(path).map(|e| &e.current)
    }

    /// Description the current definition was built from
    pub fn description(&self, path: &str) -> Option<&ClassDescription> {
        self.entries.get(path).map(|e| &e.description)
    }

    /// Check if a class is installed at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Installed paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Remove a class. Live instances keep their definition alive.
    pub fn remove(&mut self, path: &str) -> Option<Arc<ClassDef>> {
        self.entries.remove(path).map(|e| e.current)
    }

    /// Number of installed classes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no class is installed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
