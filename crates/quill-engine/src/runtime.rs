//! Runtime context
//!
//! `ScriptRuntime` owns everything a host needs to run scripts: loaded
//! classes, the instance arena, host object bindings, the call-stack
//! tracker, the profiler and the global constants. There is no ambient
//! state; independent runtimes can coexist in one process.

use std::fmt;
use std::sync::Arc;

use quill_sdk::{
    BuiltinId, BuiltinRegistry, CallError, Debugger, NativeObject, ObjectId, Signature, Variant,
};
use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::call_stack::{CallStack, StackInfo};
use crate::class::{build, ClassDef, ClassDescription, ClassRegistry, NativeClassDb};
use crate::config::{ConfigError, RuntimeOptions};
use crate::dispatch::INIT;
use crate::error::{BuildError, ConstructionError};
use crate::globals::Globals;
use crate::instance::{Instance, InstanceId};
use crate::profiler::{Profiler, ProfilingInfo};

struct HostSlot {
    object: Arc<dyn NativeObject>,
    script: Option<InstanceId>,
}

/// Script runtime context
pub struct ScriptRuntime {
    pub(crate) options: RuntimeOptions,
    pub(crate) natives: NativeClassDb,
    pub(crate) builtins: Arc<dyn BuiltinRegistry>,
    pub(crate) classes: ClassRegistry,
    pub(crate) instances: FxHashMap<InstanceId, Instance>,
    objects: FxHashMap<ObjectId, HostSlot>,
    pub(crate) call_stack: CallStack,
    pub(crate) profiler: Profiler,
    debugger: Option<Box<dyn Debugger>>,
    debug_error: String,
    globals: Globals,
}

impl ScriptRuntime {
    /// Create a runtime. The calling thread becomes the main context.
    pub fn new(
        options: RuntimeOptions,
        builtins: Arc<dyn BuiltinRegistry>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;

        let mut globals = Globals::new();
        for (name, value) in &options.globals {
            globals.add(name, value.clone());
        }
        let mut profiler = Profiler::new();
        if options.profile_on_start {
            profiler.start();
        }

        debug!(
            max_call_stack = options.max_call_stack,
            track_call_stack = options.track_call_stack,
            "script runtime created"
        );

        Ok(Self {
            call_stack: CallStack::with_capacity(options.max_call_stack),
            options,
            natives: NativeClassDb::new(),
            builtins,
            classes: ClassRegistry::new(),
            instances: FxHashMap::default(),
            objects: FxHashMap::default(),
            profiler,
            debugger: None,
            debug_error: String::new(),
            globals,
        })
    }

    /// Options the runtime was created with
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Native class database
    pub fn natives(&self) -> &NativeClassDb {
        &self.natives
    }

    /// Native class database, for registering host types
    pub fn natives_mut(&mut self) -> &mut NativeClassDb {
        &mut self.natives
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Build and install a new top-level class
    pub fn load_class(&mut self, description: ClassDescription) -> Result<Arc<ClassDef>, BuildError> {
        if self.classes.contains(&description.path) {
            return Err(BuildError::AlreadyLoaded(description.path.clone()));
        }
        let classes = &self.classes;
        let resolve = |path: &str| classes.get(path).cloned();
        let def = build(&description, &resolve, &self.natives)?;
        self.classes.install(description, def.clone());
        Ok(def)
    }

    /// Current definition at `path`
    pub fn class(&self, path: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(path).cloned()
    }

    /// Installed classes
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    // ========================================================================
    // Host objects and attachment
    // ========================================================================

    /// Register a host object. A previous object with the same id loses its
    /// script and is replaced.
    pub fn register_object(&mut self, object: Arc<dyn NativeObject>) -> ObjectId {
        let id = object.object_id();
        self.detach(id);
        self.objects.insert(
            id,
            HostSlot {
                object,
                script: None,
            },
        );
        id
    }

    /// Detach the object's script and forget the object
    pub fn destroy_object(&mut self, object: ObjectId) -> bool {
        self.detach(object);
        self.objects.remove(&object).is_some()
    }

    /// Registered host object
    pub fn object(&self, object: ObjectId) -> Option<&Arc<dyn NativeObject>> {
        self.objects.get(&object).map(|slot| &slot.object)
    }

    /// Check if a host object is registered
    pub fn has_object(&self, object: ObjectId) -> bool {
        self.objects.contains_key(&object)
    }

    /// Script instance attached to a host object
    pub fn script_instance(&self, object: ObjectId) -> Option<InstanceId> {
        self.objects.get(&object).and_then(|slot| slot.script)
    }

    /// Live instance
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    /// Number of live instances, placeholders included
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn check_owner(
        &self,
        object: ObjectId,
        def: &ClassDef,
    ) -> Result<Arc<dyn NativeObject>, ConstructionError> {
        let slot = self
            .objects
            .get(&object)
            .ok_or(ConstructionError::UnknownOwner(object))?;
        let owner_class = slot.object.native_class();
        if !self.natives.is_parent_class(owner_class, def.native_base()) {
            return Err(ConstructionError::IncompatibleOwner {
                class: def.path().to_string(),
                native_base: def.native_base().to_string(),
                owner_class: owner_class.to_string(),
            });
        }
        Ok(slot.object.clone())
    }

    fn spawn(
        &mut self,
        object: ObjectId,
        owner: &Arc<dyn NativeObject>,
        def: &Arc<ClassDef>,
        placeholder: bool,
    ) -> InstanceId {
        let instance = Instance::new(object, def.clone(), placeholder);
        let id = instance.id();
        self.instances.insert(id, instance);
        if let Some(slot) = self.objects.get_mut(&object) {
            slot.script = Some(id);
        }
        owner.notify_script_attached(def.path());
        id
    }

    /// Attach a new instance of `def` to a host object and run its
    /// initializer.
    ///
    /// Any script already attached is detached first. If the initializer
    /// fails, the instance is discarded and the object is left without a
    /// script.
    pub fn attach(
        &mut self,
        object: ObjectId,
        def: &Arc<ClassDef>,
        args: &[Variant],
    ) -> Result<InstanceId, ConstructionError> {
        let owner = self.check_owner(object, def)?;
        self.detach(object);
        let id = self.spawn(object, &owner, def, false);

        let result = match def.find_method(INIT) {
            Some((level, init)) => self.invoke(level, init, Some(id), args).map(|_| ()),
            None if !args.is_empty() => Err(CallError::TooManyArguments {
                expected: 0,
                got: args.len(),
            }),
            None => Ok(()),
        };

        if let Err(source) = result {
            if self.script_instance(object) == Some(id) {
                self.detach(object);
            } else {
                self.instances.remove(&id);
            }
            let err = ConstructionError::Initializer {
                class: def.path().to_string(),
                source,
            };
            self.report_error(&err.to_string(), false);
            return Err(err);
        }
        Ok(id)
    }

    /// Attach a property-only placeholder of `def`. No script code runs.
    pub fn attach_placeholder(
        &mut self,
        object: ObjectId,
        def: &Arc<ClassDef>,
    ) -> Result<InstanceId, ConstructionError> {
        let owner = self.check_owner(object, def)?;
        self.detach(object);
        Ok(self.spawn(object, &owner, def, true))
    }

    /// Remove the script from a host object. Returns false if none was
    /// attached.
    pub fn detach(&mut self, object: ObjectId) -> bool {
        let Some(slot) = self.objects.get_mut(&object) else {
            return false;
        };
        let Some(id) = slot.script.take() else {
            return false;
        };
        let owner = slot.object.clone();
        self.instances.remove(&id);
        owner.notify_script_detached();
        true
    }

    // ========================================================================
    // Debugger
    // ========================================================================

    /// Attach a debugger front-end
    pub fn set_debugger(&mut self, debugger: Box<dyn Debugger>) {
        self.debugger = Some(debugger);
    }

    /// Detach the debugger front-end
    pub fn take_debugger(&mut self) -> Option<Box<dyn Debugger>> {
        self.debugger.take()
    }

    /// Last error reported to the debugger
    pub fn debug_error(&self) -> &str {
        &self.debug_error
    }

    /// Record an error and break into the debugger, or log it when none is
    /// attached
    pub(crate) fn report_error(&mut self, message: &str, can_continue: bool) {
        self.debug_error = message.to_string();
        match self.debugger.as_mut() {
            Some(debugger) => {
                debugger.debug_break(message, can_continue);
            }
            None => error!(error = %message, "script error"),
        }
    }

    /// Call-stack tracker
    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Stack trace, most recent call first
    pub fn debug_stack_info(&self) -> Vec<StackInfo> {
        self.call_stack.info()
    }

    /// Number of active tracked calls
    pub fn stack_level_count(&self) -> usize {
        self.call_stack.depth()
    }

    /// Line cursor of a level (0 is the most recent call)
    pub fn stack_level_line(&self, level: usize) -> Option<u32> {
        self.call_stack.frame(level).map(|f| f.state.line())
    }

    /// Function name of a level
    pub fn stack_level_function(&self, level: usize) -> Option<String> {
        self.call_stack
            .frame(level)
            .map(|f| f.function.name().to_string())
    }

    /// Source path of a level
    pub fn stack_level_source(&self, level: usize) -> Option<String> {
        self.call_stack
            .frame(level)
            .map(|f| f.class.path().to_string())
    }

    /// Value stack of a level, bottom first
    pub fn stack_level_locals(&self, level: usize) -> Vec<Variant> {
        self.call_stack
            .frame(level)
            .map(|f| f.state.values())
            .unwrap_or_default()
    }

    /// Members of the instance running at a level
    pub fn stack_level_members(&self, level: usize) -> Vec<(String, Variant)> {
        self.call_stack
            .frame(level)
            .and_then(|f| f.instance)
            .and_then(|id| self.instances.get(&id))
            .map(Instance::members)
            .unwrap_or_default()
    }

    // ========================================================================
    // Globals and builtins
    // ========================================================================

    /// Add a global constant, overwriting an existing one in place
    pub fn add_global_constant(&mut self, name: &str, value: Variant) -> usize {
        self.globals.add(name, value)
    }

    /// Value of a global constant
    pub fn global(&self, name: &str) -> Option<&Variant> {
        self.globals.get(name)
    }

    /// Index of a global constant
    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.globals.index(name)
    }

    /// Global constants by index
    pub fn globals(&self) -> &[Variant] {
        self.globals.values()
    }

    /// Builtin registry
    pub fn builtins(&self) -> &Arc<dyn BuiltinRegistry> {
        &self.builtins
    }

    /// Call a builtin after checking its declared arity
    pub fn call_builtin(&self, id: BuiltinId, args: &[Variant]) -> Result<Variant, CallError> {
        let function = self
            .builtins
            .resolve(id)
            .ok_or_else(|| CallError::InvalidMethod(id.to_string()))?;
        if let Some(signature) = self.builtins.signature(id) {
            let expected = signature.arity();
            if args.len() > expected {
                return Err(CallError::TooManyArguments {
                    expected,
                    got: args.len(),
                });
            }
            if args.len() < expected {
                return Err(CallError::TooFewArguments {
                    expected,
                    got: args.len(),
                });
            }
        }
        function(args)
    }

    /// Evaluate a builtin at build time. Only deterministic builtins fold.
    pub fn fold_builtin(&self, id: BuiltinId, args: &[Variant]) -> Option<Variant> {
        if !self.builtins.is_deterministic(id) {
            return None;
        }
        self.call_builtin(id, args).ok()
    }

    /// Signatures of every builtin
    pub fn public_functions(&self) -> Vec<Signature> {
        self.builtins
            .ids()
            .into_iter()
            .filter_map(|id| self.builtins.signature(id))
            .collect()
    }

    /// Constants exposed to every script
    pub fn public_constants(&self) -> Vec<(String, Variant)> {
        Globals::public_constants()
    }

    // ========================================================================
    // Profiling
    // ========================================================================

    /// Reset all counters and start timing
    pub fn profiling_start(&mut self) {
        self.profiler.start();
    }

    /// Stop timing
    pub fn profiling_stop(&mut self) {
        self.profiler.stop();
    }

    /// Close the current frame
    pub fn frame(&mut self) {
        self.profiler.frame();
    }

    /// Accumulated counters, at most `max` entries
    pub fn profiling_accumulated(&self, max: usize) -> Vec<ProfilingInfo> {
        self.profiler.accumulated(max)
    }

    /// Last-frame counters, at most `max` entries
    pub fn profiling_frame_data(&self, max: usize) -> Vec<ProfilingInfo> {
        self.profiler.frame_data(max)
    }

    /// Profiler state
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }
}

impl fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("options", &self.options)
            .field("classes", &self.classes.paths())
            .field("instances", &self.instances.len())
            .field("objects", &self.objects.len())
            .field("call_depth", &self.call_stack.depth())
            .finish()
    }
}
