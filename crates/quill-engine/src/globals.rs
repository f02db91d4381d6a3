//! Global constant table

use std::f64::consts::PI;

use quill_sdk::Variant;
use rustc_hash::FxHashMap;

/// Named global constants with stable indices
#[derive(Debug, Clone, Default)]
pub struct Globals {
    indices: FxHashMap<String, usize>,
    values: Vec<Variant>,
    names: Vec<String>,
}

impl Globals {
    /// Table holding the public constants
    pub fn new() -> Self {
        let mut globals = Self::default();
        for (name, value) in Self::public_constants() {
            globals.add(&name, value);
        }
        globals
    }

    /// Constants every runtime exposes
    pub fn public_constants() -> Vec<(String, Variant)> {
        vec![("PI".to_string(), Variant::Float(PI))]
    }

    /// Add a constant, overwriting in place if the name exists
    pub fn add(&mut self, name: &str, value: Variant) -> usize {
        if let Some(&index) = self.indices.get(name) {
            self.values[index] = value;
            return index;
        }
        let index = self.values.len();
        self.indices.insert(name.to_string(), index);
        self.values.push(value);
        self.names.push(name.to_string());
        index
    }

    /// Value of a constant
    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.indices.get(name).and_then(|&i| self.values.get(i))
    }

    /// Index of a constant
    pub fn index(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Values by index
    pub fn values(&self) -> &[Variant] {
        &self.values
    }

    /// Names by index
    pub fn names(&self) -> &[String] {
        &self.names
    }
}
