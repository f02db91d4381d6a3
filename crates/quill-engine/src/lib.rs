//! Quill Engine - script class runtime
//!
//! This crate provides the core of the Quill script runtime:
//! - Class definitions built from loader descriptions, with inheritance
//! - Script instances attached to native host objects
//! - The dispatcher (property get/set, calls, multilevel calls, notifications)
//! - The reload coordinator (soft and hard hot reload, feature `hot-reload`)
//! - The call-stack tracker and profiler used by debuggers
//!
//! Everything hangs off an explicit [`ScriptRuntime`]; there is no global
//! state.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod call_stack;
pub mod class;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod function;
pub mod globals;
pub mod instance;
pub mod profiler;
pub mod property;
#[cfg(feature = "hot-reload")]
pub mod reload;
pub mod runtime;

pub use call_stack::{CallFrame, CallStack, ExecState, StackInfo};
pub use class::{
    build, ClassDef, ClassDescription, ClassMember, ClassRegistry, DefinitionId, MemberDecl,
    MemberSlot, NativeClassDb,
};
pub use config::{ConfigError, RuntimeOptions};
pub use error::{BuildError, CallStackError, ConstructionError, ReloadError};
pub use function::{CallContext, FnMethod, ScriptFunction};
pub use instance::{Instance, InstanceId};
pub use profiler::{FunctionProfile, Profiler, ProfilingInfo};
pub use property::{MethodInfo, PropertyInfo, PropertyUsage, SignalInfo};
#[cfg(feature = "hot-reload")]
pub use reload::{ReloadMode, ReloadOrder, ReloadReport};
pub use runtime::ScriptRuntime;

pub use quill_sdk::{CallError, ObjectId, Variant, VariantType};
