//! Dependency order for batch reload
//!
//! A precedes B iff A appears in the base chain of B or of one of B's
//! nested classes. Unrelated classes keep their input order.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::error::ReloadError;

/// Build dependencies among the classes of one reload batch
#[derive(Debug, Clone, Default)]
pub struct ReloadOrder {
    /// Paths in input order
    nodes: Vec<String>,
    /// path -> paths it builds against (its base and the bases of its
    /// nested classes)
    deps: FxHashMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl ReloadOrder {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class and the paths it depends on. Dependencies outside the
    /// batch are ignored by `sort`.
    pub fn add(&mut self, path: &str, dependencies: &[&str]) {
        if !self.nodes.iter().any(|n| n == path) {
            self.nodes.push(path.to_string());
        }
        let deps = self.deps.entry(path.to_string()).or_default();
        for dep in dependencies {
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }
    }

    fn deps_in_batch<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.deps
            .get(path)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(move |dep| self.nodes.iter().any(|n| n == dep))
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        stack: &mut Vec<&'a str>,
        marks: &mut FxHashMap<&'a str, Mark>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let pos = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for dep in self.deps_in_batch(node) {
            if let Some(cycle) = self.visit(dep, stack, marks) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    /// Find a dependency cycle, if any
    ///
    /// # Returns
    /// * `Some(Vec<String>)` - The cycle, first element repeated at the end
    /// * `None` - No cycles detected
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut marks: FxHashMap<&str, Mark> = FxHashMap::default();
        for start in &self.nodes {
            let mut stack = Vec::new();
            if let Some(cycle) = self.visit(start, &mut stack, &mut marks) {
                return Some(cycle);
            }
        }
        None
    }

    /// Paths with every dependency before its dependents
    pub fn sort(&self) -> Result<Vec<String>, ReloadError> {
        if let Some(cycle) = self.detect_cycle() {
            return Err(ReloadError::CyclicDependency(cycle.join(" -> ")));
        }

        // Kahn's algorithm over dependency -> dependent edges
        let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
        let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for node in &self.nodes {
            in_degree.entry(node.as_str()).or_insert(0);
            for dep in self.deps_in_batch(node) {
                dependents.entry(dep).or_default().push(node.as_str());
                *in_degree.entry(node.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| in_degree.get(n).copied() == Some(0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());
            if let Some(children) = dependents.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*child);
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Number of classes in the batch
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
