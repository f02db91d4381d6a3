//! Host-side contracts: native objects and the debugger front-end

use crate::value::ObjectId;

/// Native host object that a script instance can augment.
///
/// The runtime never owns the host object's lifetime; it only calls the
/// attach/detach hooks and asks for the native class name.
pub trait NativeObject: Send + Sync {
    /// Stable identity assigned by the host
    fn object_id(&self) -> ObjectId;

    /// Name of the native class (as registered in the native class database)
    fn native_class(&self) -> &str;

    /// Called after a script instance has been bound to this object
    fn notify_script_attached(&self, _class_path: &str) {}

    /// Called after the script instance has been removed from this object
    fn notify_script_detached(&self) {}
}

/// Debugger front-end.
///
/// The runtime calls `debug_break` on stack discipline violations and on
/// construction failures while a debugger is attached.
pub trait Debugger: Send {
    /// Break into the debugger. Returns `true` if the debugger chose to
    /// continue execution.
    fn debug_break(&mut self, error: &str, can_continue: bool) -> bool;
}
