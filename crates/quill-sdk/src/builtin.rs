//! Builtin function registry
//!
//! The runtime treats builtins as an opaque table keyed by [`BuiltinId`].
//! Hosts implement [`BuiltinRegistry`] or fill a [`BuiltinFunctionRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CallError;
use crate::value::{Variant, VariantType};

/// Enumerated builtin function id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuiltinId(pub u16);

impl fmt::Display for BuiltinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "builtin#{}", self.0)
    }
}

/// Argument and return types of a builtin
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Public name
    pub name: String,
    /// Named, typed arguments in order (`Nil` means any)
    pub arguments: Vec<(String, VariantType)>,
    /// Return type (`Nil` means any or none)
    pub return_type: VariantType,
}

impl Signature {
    /// Create a signature with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            return_type: VariantType::Nil,
        }
    }

    /// Add an argument
    pub fn arg(mut self, name: impl Into<String>, ty: VariantType) -> Self {
        self.arguments.push((name.into(), ty));
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: VariantType) -> Self {
        self.return_type = ty;
        self
    }

    /// Number of declared arguments
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }
}

/// Callable builtin body
pub type BuiltinFn = Arc<dyn Fn(&[Variant]) -> Result<Variant, CallError> + Send + Sync>;

/// Registry contract consumed by the runtime
pub trait BuiltinRegistry: Send + Sync {
    /// Resolve an id to its callable
    fn resolve(&self, id: BuiltinId) -> Option<BuiltinFn>;

    /// Whether the builtin always yields the same result for the same arguments
    fn is_deterministic(&self, id: BuiltinId) -> bool;

    /// Argument and return types
    fn signature(&self, id: BuiltinId) -> Option<Signature>;

    /// Every registered id, ascending
    fn ids(&self) -> Vec<BuiltinId>;
}

struct Entry {
    signature: Signature,
    deterministic: bool,
    handler: BuiltinFn,
}

/// Map-backed [`BuiltinRegistry`]
#[derive(Default)]
pub struct BuiltinFunctionRegistry {
    entries: BTreeMap<BuiltinId, Entry>,
}

impl BuiltinFunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builtin, replacing any previous entry with the same id
    pub fn register<F>(&mut self, id: BuiltinId, signature: Signature, deterministic: bool, f: F)
    where
        F: Fn(&[Variant]) -> Result<Variant, CallError> + Send + Sync + 'static,
    {
        self.entries.insert(
            id,
            Entry {
                signature,
                deterministic,
                handler: Arc::new(f),
            },
        );
    }

    /// Number of registered builtins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no builtin is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BuiltinRegistry for BuiltinFunctionRegistry {
    fn resolve(&self, id: BuiltinId) -> Option<BuiltinFn> {
        self.entries.get(&id).map(|e| e.handler.clone())
    }

    fn is_deterministic(&self, id: BuiltinId) -> bool {
        self.entries.get(&id).map_or(false, |e| e.deterministic)
    }

    fn signature(&self, id: BuiltinId) -> Option<Signature> {
        self.entries.get(&id).map(|e| e.signature.clone())
    }

    fn ids(&self) -> Vec<BuiltinId> {
        self.entries.keys().copied().collect()
    }
}

impl fmt::Debug for BuiltinFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunctionRegistry")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BuiltinFunctionRegistry {
        let mut reg = BuiltinFunctionRegistry::new();
        reg.register(
            BuiltinId(0),
            Signature::new("abs")
                .arg("x", VariantType::Int)
                .returns(VariantType::Int),
            true,
            |args| match args.first() {
                Some(Variant::Int(i)) => Ok(Variant::Int(i.abs())),
                _ => Err(CallError::InvalidArgument {
                    index: 0,
                    expected: "int".into(),
                }),
            },
        );
        reg.register(BuiltinId(1), Signature::new("randi"), false, |_| {
            Ok(Variant::Int(4))
        });
        reg
    }

    #[test]
    fn test_resolve_and_call() {
        let reg = registry();
        let abs = reg.resolve(BuiltinId(0)).unwrap();
        assert_eq!(abs(&[Variant::Int(-3)]).unwrap(), Variant::Int(3));
        assert!(reg.resolve(BuiltinId(9)).is_none());
    }

    #[test]
    fn test_metadata() {
        let reg = registry();
        assert!(reg.is_deterministic(BuiltinId(0)));
        assert!(!reg.is_deterministic(BuiltinId(1)));
        assert!(!reg.is_deterministic(BuiltinId(9)));
        assert_eq!(reg.signature(BuiltinId(0)).unwrap().arity(), 1);
        assert_eq!(reg.ids(), vec![BuiltinId(0), BuiltinId(1)]);
        assert_eq!(reg.len(), 2);
    }
}
