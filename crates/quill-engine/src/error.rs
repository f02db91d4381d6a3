//! Error types for class building, construction, call-stack discipline and reload

use quill_sdk::{CallError, ObjectId};
use thiserror::Error;

/// Structural errors detected while building a class definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// Member declared twice, or shadowing an inherited member
    #[error("{class}: member '{member}' already exists")]
    DuplicateMember {
        /// Class path
        class: String,
        /// Member name
        member: String,
    },

    /// Method declared twice in the same class
    #[error("{class}: function '{method}' already exists")]
    DuplicateMethod {
        /// Class path
        class: String,
        /// Method name
        method: String,
    },

    /// Constant declared twice in the same class
    #[error("{class}: constant '{constant}' already exists")]
    DuplicateConstant {
        /// Class path
        class: String,
        /// Constant name
        constant: String,
    },

    /// Nested class declared twice in the same class
    #[error("{class}: subclass '{name}' already exists")]
    DuplicateSubclass {
        /// Class path
        class: String,
        /// Subclass name
        name: String,
    },

    /// The base chain leads back to the class being built
    #[error("Cyclic inheritance: {chain}")]
    CyclicInheritance {
        /// Class path
        class: String,
        /// Offending chain, joined with " -> "
        chain: String,
    },

    /// Base class path does not name a loaded class
    #[error("{class}: could not resolve base class '{base}'")]
    UnresolvedBase {
        /// Class path
        class: String,
        /// Base path
        base: String,
    },

    /// Native base is not registered in the native class database
    #[error("{class}: unknown native class '{native}'")]
    UnresolvedNativeBase {
        /// Class path
        class: String,
        /// Native class name
        native: String,
    },

    /// Declared native base disagrees with the one inherited from the base class
    #[error("{class}: native base '{found}' does not match inherited '{expected}'")]
    NativeBaseMismatch {
        /// Class path
        class: String,
        /// Native base inherited from the script base
        expected: String,
        /// Native base declared by the class
        found: String,
    },

    /// Getter or setter names a function that does not exist along the chain
    #[error("{class}: accessor '{method}' of member '{member}' not found")]
    MalformedAccessor {
        /// Class path
        class: String,
        /// Member name
        member: String,
        /// Accessor function name
        method: String,
    },

    /// A class with this path is already loaded
    #[error("Class already loaded: {0}")]
    AlreadyLoaded(String),

    /// A native class with this name is already registered
    #[error("Native class already registered: {0}")]
    DuplicateNativeClass(String),
}

/// Failures while attaching a script instance to a native owner
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    /// The owner was never registered with the runtime
    #[error("Unknown owner object {0}")]
    UnknownOwner(ObjectId),

    /// The owner's native class does not derive from the class's native base
    #[error("Script '{class}' inherits from native type '{native_base}', so it can't be attached to an object of type '{owner_class}'")]
    IncompatibleOwner {
        /// Class path
        class: String,
        /// Native base required by the class
        native_base: String,
        /// Native class of the owner
        owner_class: String,
    },

    /// The `_init` function reported an error
    #[error("Constructor of '{class}' failed: {source}")]
    Initializer {
        /// Class path
        class: String,
        /// Error reported by the initializer
        #[source]
        source: CallError,
    },
}

/// Call-stack discipline violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallStackError {
    /// Push at capacity
    #[error("Stack Overflow (Stack Size: {capacity})")]
    Overflow {
        /// Configured capacity
        capacity: usize,
    },

    /// Pop on an empty stack
    #[error("Stack Underflow (Engine Bug)")]
    Underflow,
}

/// Reload batch failures. Nothing is installed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReloadError {
    /// No class with this path is loaded
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// One definition of the batch failed to build
    #[error("Failed to rebuild '{path}': {source}")]
    Build {
        /// Path of the failing definition
        path: String,
        /// Structural error
        #[source]
        source: BuildError,
    },

    /// The new base links form a cycle among the affected classes
    #[error("Circular inheritance between reloaded classes: {0}")]
    CyclicDependency(String),
}
