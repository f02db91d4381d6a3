//! Reload coordinator
//!
//! Rebuilds a class together with every loaded class that inherits from
//! it, bases strictly before derived classes. Builds are staged: if any
//! definition of the batch fails, nothing is installed and no instance is
//! touched.

mod coordinator;
mod order;

pub use coordinator::{ReloadMode, ReloadReport};
pub use order::ReloadOrder;
