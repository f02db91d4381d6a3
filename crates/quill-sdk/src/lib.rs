//! Quill SDK - contracts shared between the script runtime and its host
//!
//! This crate holds the types a host or a byte-code loader needs without
//! depending on the full quill-engine: the dynamic [`Variant`] value, call
//! errors, the builtin function registry and the host object contracts.

#![warn(missing_docs)]

pub mod builtin;
pub mod error;
pub mod host;
pub mod value;

pub use builtin::{BuiltinFn, BuiltinFunctionRegistry, BuiltinId, BuiltinRegistry, Signature};
pub use error::{CallError, CallResult};
pub use host::{Debugger, NativeObject};
pub use value::{ObjectId, Variant, VariantType};
