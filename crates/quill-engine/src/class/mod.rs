//! Class definitions: shape, builder, native class database and registry

mod builder;
mod definition;
mod native;
mod registry;

pub use builder::{build, ClassDescription, MemberDecl};
pub use definition::{ClassDef, ClassMember, DefinitionId, MemberSlot};
pub use native::{NativeClassDb, ROOT_NATIVE_CLASS};
pub use registry::ClassRegistry;
