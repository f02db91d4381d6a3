//! Native class database
//!
//! Host types a script can attach to, with parent links and integer
//! constants. Resolves `native_base` at build time and checks owner
//! compatibility at attach time.

use std::collections::BTreeMap;

use crate::error::BuildError;

/// Name of the pre-registered root native class
pub const ROOT_NATIVE_CLASS: &str = "Object";

#[derive(Debug, Clone, Default)]
struct NativeClassInfo {
    parent: Option<String>,
    constants: BTreeMap<String, i64>,
}

/// Registry of host native classes
#[derive(Debug, Clone)]
pub struct NativeClassDb {
    classes: BTreeMap<String, NativeClassInfo>,
}

impl NativeClassDb {
    /// Create a database containing only the root class
    pub fn new() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(ROOT_NATIVE_CLASS.to_string(), NativeClassInfo::default());
        Self { classes }
    }

    /// Register `name` as a subclass of `parent`
    pub fn register(&mut self, name: &str, parent: &str) -> Result<(), BuildError> {
        if self.classes.contains_key(name) {
            return Err(BuildError::DuplicateNativeClass(name.to_string()));
        }
        if !self.classes.contains_key(parent) {
            return Err(BuildError::UnresolvedNativeBase {
                class: name.to_string(),
                native: parent.to_string(),
            });
        }
        self.classes.insert(
            name.to_string(),
            NativeClassInfo {
                parent: Some(parent.to_string()),
                constants: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Add an integer constant to a registered class. Returns false if the
    /// class is unknown.
    pub fn add_constant(&mut self, class: &str, name: &str, value: i64) -> bool {
        match self.classes.get_mut(class) {
            Some(info) => {
                info.constants.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Check if a class is registered
    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Parent of a registered class
    pub fn parent(&self, class: &str) -> Option<&str> {
        self.classes.get(class)?.parent.as_deref()
    }

    /// Check if `class` is `parent` or derives from it
    pub fn is_parent_class(&self, class: &str, parent: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == parent {
                return self.classes.contains_key(name);
            }
            current = self.parent(name);
        }
        false
    }

    /// Look up an integer constant on `class` or any of its parents
    pub fn integer_constant(&self, class: &str, name: &str) -> Option<i64> {
        let mut current = Some(class);
        while let Some(class_name) = current {
            let info = self.classes.get(class_name)?;
            if let Some(value) = info.constants.get(name) {
                return Some(*value);
            }
            current = info.parent.as_deref();
        }
        None
    }

    /// Constants declared directly on `class`, sorted by name
    pub fn constants(&self, class: &str) -> Vec<(String, i64)> {
        self.classes
            .get(class)
            .map(|info| {
                info.constants
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for NativeClassDb {
    fn default() -> Self {
        Self::new()
    }
}
