//! Script functions and the context their bodies run in
//!
//! Compiled byte-code is out of scope for the core: a loader hands the
//! builder any [`ScriptFunction`]. [`FnMethod`] wraps a Rust closure and is
//! what hosts without a compiler (and the tests) use.

use std::fmt;
use std::sync::Arc;

use quill_sdk::{CallError, Variant};

use crate::call_stack::ExecState;
use crate::class::ClassDef;
use crate::instance::InstanceId;
use crate::runtime::ScriptRuntime;

/// A callable script function
pub trait ScriptFunction: Send + Sync {
    /// Function name
    fn name(&self) -> &str;

    /// Maximum number of arguments
    fn argument_count(&self) -> usize;

    /// Number of trailing arguments that may be omitted
    fn default_argument_count(&self) -> usize {
        0
    }

    /// Callable without an instance
    fn is_static(&self) -> bool {
        false
    }

    /// Execute the body
    fn call(&self, ctx: &mut CallContext<'_>, args: &[Variant]) -> Result<Variant, CallError>;
}

impl fmt::Debug for dyn ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}

/// Body of a closure-backed method
pub type MethodBody =
    dyn Fn(&mut CallContext<'_>, &[Variant]) -> Result<Variant, CallError> + Send + Sync;

/// Closure-backed [`ScriptFunction`]
pub struct FnMethod {
    name: String,
    argument_count: usize,
    default_argument_count: usize,
    is_static: bool,
    body: Box<MethodBody>,
}

impl FnMethod {
    /// Create a method taking exactly `argument_count` arguments
    pub fn new<F>(name: impl Into<String>, argument_count: usize, body: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Variant]) -> Result<Variant, CallError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            argument_count,
            default_argument_count: 0,
            is_static: false,
            body: Box::new(body),
        }
    }

    /// Allow the last `count` arguments to be omitted
    pub fn with_defaults(mut self, count: usize) -> Self {
        self.default_argument_count = count.min(self.argument_count);
        self
    }

    /// Mark as static
    pub fn static_fn(mut self) -> Self {
        self.is_static = true;
        self
    }
}

impl ScriptFunction for FnMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn argument_count(&self) -> usize {
        self.argument_count
    }

    fn default_argument_count(&self) -> usize {
        self.default_argument_count
    }

    fn is_static(&self) -> bool {
        self.is_static
    }

    fn call(&self, ctx: &mut CallContext<'_>, args: &[Variant]) -> Result<Variant, CallError> {
        (self.body)(ctx, args)
    }
}

/// Check `args` against the declared arity of `function`
pub(crate) fn check_arity(function: &dyn ScriptFunction, got: usize) -> Result<(), CallError> {
    let max = function.argument_count();
    let min = max.saturating_sub(function.default_argument_count());
    if got > max {
        return Err(CallError::TooManyArguments { expected: max, got });
    }
    if got < min {
        return Err(CallError::TooFewArguments { expected: min, got });
    }
    Ok(())
}

// ============================================================================
// CallContext
// ============================================================================

/// What a running function body can see and touch
pub struct CallContext<'a> {
    runtime: &'a mut ScriptRuntime,
    this: Option<InstanceId>,
    class: Arc<ClassDef>,
    state: Arc<ExecState>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        runtime: &'a mut ScriptRuntime,
        this: Option<InstanceId>,
        class: Arc<ClassDef>,
        state: Arc<ExecState>,
    ) -> Self {
        Self {
            runtime,
            this,
            class,
            state,
        }
    }

    /// The runtime the call executes in
    pub fn runtime(&mut self) -> &mut ScriptRuntime {
        self.runtime
    }

    /// The receiving instance (`None` for static calls)
    pub fn this(&self) -> Option<InstanceId> {
        self.this
    }

    /// The class level that defines the running function
    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    fn require_this(&self) -> Result<InstanceId, CallError> {
        self.this.ok_or(CallError::InstanceIsNull)
    }

    /// Read a member slot directly, bypassing getters
    pub fn member(&self, name: &str) -> Result<Variant, CallError> {
        let id = self.require_this()?;
        let instance = self
            .runtime
            .instance(id)
            .ok_or(CallError::InstanceIsNull)?;
        instance
            .member(name)
            .cloned()
            .ok_or_else(|| CallError::Failed(format!("Invalid member '{}'", name)))
    }

    /// Write a member slot directly, bypassing setters
    pub fn set_member(&mut self, name: &str, value: Variant) -> Result<(), CallError> {
        let id = self.require_this()?;
        let instance = self
            .runtime
            .instance_mut(id)
            .ok_or(CallError::InstanceIsNull)?;
        let slot = instance
            .definition()
            .member_slot(name)
            .cloned()
            .ok_or_else(|| CallError::Failed(format!("Invalid member '{}'", name)))?;
        let value = slot.coerce(value).ok_or_else(|| CallError::InvalidArgument {
            index: 0,
            expected: slot.value_type.name().to_string(),
        })?;
        instance.write_slot(slot.index, value);
        Ok(())
    }

    /// Property read on `this` through the full dispatch chain
    pub fn get(&mut self, name: &str) -> Result<Option<Variant>, CallError> {
        let id = self.require_this()?;
        Ok(self.runtime.get(id, name))
    }

    /// Property write on `this` through the full dispatch chain
    pub fn set(&mut self, name: &str, value: Variant) -> Result<bool, CallError> {
        let id = self.require_this()?;
        Ok(self.runtime.set(id, name, value))
    }

    /// Method call on `this` through the full dispatch chain
    pub fn call(&mut self, name: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let id = self.require_this()?;
        self.runtime.call(id, name, args)
    }

    /// Update the line cursor reported in stack traces
    pub fn set_line(&self, line: u32) {
        self.state.set_line(line);
    }

    /// Update the instruction cursor
    pub fn set_ip(&self, ip: usize) {
        self.state.set_ip(ip);
    }

    /// Push onto the frame's value stack (reported as locals)
    pub fn push_value(&self, value: Variant) {
        self.state.push(value);
    }

    /// Pop from the frame's value stack
    pub fn pop_value(&self) -> Option<Variant> {
        self.state.pop()
    }
}
