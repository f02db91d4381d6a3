//! Dispatcher
//!
//! Property access and method calls walk the resolution levels of an
//! instance's definition (the definition, then its base, and so on). Per
//! level, `get`/`set` try in order:
//!
//! 1. a member slot, through its getter/setter when one is declared
//! 2. a constant visible from that level
//! 3. the level's `_get`/`_set` hook, if it defines one
//!
//! and stop at the first level that resolves the request. `call` invokes the
//! first function found and never looks further, even if it fails.

use std::sync::Arc;

use quill_sdk::{CallError, Variant, VariantType};
use tracing::{debug, warn};

use crate::call_stack::{CallFrame, ExecState};
use crate::class::{ClassDef, ClassMember};
use crate::function::{check_arity, CallContext, ScriptFunction};
use crate::instance::InstanceId;
use crate::property::{MethodInfo, PropertyInfo, PropertyUsage};
use crate::runtime::ScriptRuntime;

/// Initializer run on attach
pub const INIT: &str = "_init";
/// Notification hook, delivered to every level
pub const NOTIFICATION: &str = "_notification";
/// Fallback write hook: `_set(name, value)`, truthy result means handled
pub const SET_HOOK: &str = "_set";
/// Fallback read hook: `_get(name)`, non-nil result means handled
pub const GET_HOOK: &str = "_get";
/// Extra property enumeration hook
pub const GET_PROPERTY_LIST_HOOK: &str = "_get_property_list";

impl ScriptRuntime {
    fn dispatch_target(&self, id: InstanceId) -> Option<(Arc<ClassDef>, bool)> {
        self.instances
            .get(&id)
            .map(|i| (i.definition().clone(), i.is_placeholder()))
    }

    /// Run one function with arity checks, call-stack tracking and profiling
    pub(crate) fn invoke(
        &mut self,
        level: &Arc<ClassDef>,
        function: &Arc<dyn ScriptFunction>,
        this: Option<InstanceId>,
        args: &[Variant],
    ) -> Result<Variant, CallError> {
        check_arity(&**function, args.len())?;

        let state = Arc::new(ExecState::new());
        let tracked = self.options.track_call_stack;
        if tracked {
            let frame = CallFrame {
                state: state.clone(),
                function: function.clone(),
                class: level.clone(),
                instance: this,
            };
            if let Err(err) = self.call_stack.push(frame) {
                self.report_error(&err.to_string(), false);
                return Err(CallError::StackOverflow(self.call_stack.capacity()));
            }
        }
        let profiled = self
            .profiler
            .enter(|| format!("{}::{}", level.path(), function.name()));

        let result = {
            let mut ctx = CallContext::new(self, this, level.clone(), state);
            function.call(&mut ctx, args)
        };

        if profiled {
            self.profiler.exit();
        }
        if tracked {
            if let Err(err) = self.call_stack.pop() {
                self.report_error(&err.to_string(), false);
            }
        }
        result
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Read a property. `None` means no level resolved the name.
    pub fn get(&mut self, id: InstanceId, name: &str) -> Option<Variant> {
        let (def, placeholder) = self.dispatch_target(id)?;

        for level in def.levels() {
            if let Some(slot) = level.member_slot(name) {
                if let (Some(getter), false) = (&slot.getter, placeholder) {
                    match self.call(id, getter, &[]) {
                        Ok(value) => return Some(value),
                        Err(err) => warn!(
                            class = %level.path(),
                            member = name,
                            getter = %getter,
                            error = %err,
                            "getter failed, reading raw slot"
                        ),
                    }
                }
                return self.instances.get(&id)?.member(name).cloned();
            }

            if let Some(value) = level.find_constant(name) {
                return Some(value.clone());
            }

            if placeholder {
                continue;
            }
            if let Some(hook) = level.own_method(GET_HOOK) {
                match self.invoke(level, hook, Some(id), &[Variant::from(name)]) {
                    Ok(value) if !value.is_nil() => return Some(value),
                    Ok(_) => {}
                    Err(err) => debug!(class = %level.path(), member = name, error = %err, "_get hook failed"),
                }
            }
        }
        None
    }

    /// Write a property. Returns false if the name did not resolve or the
    /// write was rejected.
    pub fn set(&mut self, id: InstanceId, name: &str, value: Variant) -> bool {
        let Some((def, placeholder)) = self.dispatch_target(id) else {
            return false;
        };

        for level in def.levels() {
            if let Some(slot) = level.member_slot(name) {
                if let (Some(setter), false) = (&slot.setter, placeholder) {
                    return match self.call(id, setter, &[value]) {
                        Ok(_) => true,
                        Err(err) => {
                            warn!(
                                class = %level.path(),
                                member = name,
                                setter = %setter,
                                error = %err,
                                "setter failed"
                            );
                            false
                        }
                    };
                }
                let Some(value) = slot.coerce(value) else {
                    warn!(
                        class = %level.path(),
                        member = name,
                        expected = %slot.value_type,
                        "value does not match member type"
                    );
                    return false;
                };
                let index = slot.index;
                return match self.instances.get_mut(&id) {
                    Some(instance) => {
                        instance.write_slot(index, value);
                        true
                    }
                    None => false,
                };
            }

            if level.find_constant(name).is_some() {
                warn!(class = %level.path(), constant = name, "assignment to a constant");
                return false;
            }

            if placeholder {
                continue;
            }
            if let Some(hook) = level.own_method(SET_HOOK) {
                match self.invoke(level, hook, Some(id), &[Variant::from(name), value.clone()]) {
                    Ok(handled) if handled.is_truthy() => return true,
                    Ok(_) => {}
                    Err(err) => debug!(class = %level.path(), member = name, error = %err, "_set hook failed"),
                }
            }
        }
        false
    }

    /// Declared type of a member; `Nil` means untyped
    pub fn property_type(&self, id: InstanceId, name: &str) -> Option<VariantType> {
        let instance = self.instances.get(&id)?;
        instance
            .definition()
            .member_slot(name)
            .map(|slot| slot.value_type)
    }

    /// Every property across the chain, most-derived level first. Each
    /// level lists its own members in declared order, followed by whatever
    /// its `_get_property_list` hook returns.
    pub fn property_list(&mut self, id: InstanceId) -> Vec<PropertyInfo> {
        let Some((def, placeholder)) = self.dispatch_target(id) else {
            return Vec::new();
        };
        let mut list = Vec::new();

        for level in def.levels() {
            for name in level.own_members() {
                if let Some(slot) = level.member_slot(name) {
                    list.push(PropertyInfo {
                        name: name.clone(),
                        value_type: slot.value_type,
                        default: slot.default.clone(),
                        usage: PropertyUsage::DEFAULT | PropertyUsage::SCRIPT_VARIABLE,
                    });
                }
            }

            if placeholder {
                continue;
            }
            let Some(hook) = level.own_method(GET_PROPERTY_LIST_HOOK) else {
                continue;
            };
            match self.invoke(level, hook, Some(id), &[]) {
                Ok(Variant::Array(entries)) => {
                    for entry in &entries {
                        match PropertyInfo::from_dictionary(entry) {
                            Some(info) => list.push(info),
                            None => warn!(
                                class = %level.path(),
                                entry = %entry,
                                "malformed _get_property_list entry skipped"
                            ),
                        }
                    }
                }
                Ok(other) => warn!(
                    class = %level.path(),
                    returned = %other.get_type(),
                    "_get_property_list must return an array"
                ),
                Err(err) => debug!(class = %level.path(), error = %err, "_get_property_list failed"),
            }
        }
        list
    }

    /// Name/value pairs of every storage property, read through `get`
    pub fn property_state(&mut self, id: InstanceId) -> Vec<(String, Variant)> {
        let properties = self.property_list(id);
        let mut state = Vec::with_capacity(properties.len());
        for property in properties {
            if !property.usage.contains(PropertyUsage::STORAGE) {
                continue;
            }
            if let Some(value) = self.get(id, &property.name) {
                state.push((property.name, value));
            }
        }
        state
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call the first function named `name` along the chain
    pub fn call(&mut self, id: InstanceId, name: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let (def, placeholder) = self.dispatch_target(id).ok_or(CallError::InstanceIsNull)?;
        if placeholder {
            return Err(CallError::InvalidMethod(name.to_string()));
        }
        match def.find_method(name) {
            Some((level, function)) => self.invoke(level, function, Some(id), args),
            None => Err(CallError::InvalidMethod(name.to_string())),
        }
    }

    /// Call `name` at every level that defines it, most-derived first.
    /// Failures are logged and do not stop the walk. Returns the number of
    /// levels invoked.
    pub fn call_multilevel(&mut self, id: InstanceId, name: &str, args: &[Variant]) -> usize {
        let Some((def, placeholder)) = self.dispatch_target(id) else {
            return 0;
        };
        if placeholder {
            return 0;
        }
        let levels: Vec<_> = def.levels().cloned().collect();
        self.call_levels(id, name, args, levels.iter())
    }

    /// Like [`call_multilevel`](Self::call_multilevel), root base first
    pub fn call_multilevel_reversed(&mut self, id: InstanceId, name: &str, args: &[Variant]) -> usize {
        let Some((def, placeholder)) = self.dispatch_target(id) else {
            return 0;
        };
        if placeholder {
            return 0;
        }
        let levels: Vec<_> = def.levels().cloned().collect();
        self.call_levels(id, name, args, levels.iter().rev())
    }

    fn call_levels<'a>(
        &mut self,
        id: InstanceId,
        name: &str,
        args: &[Variant],
        levels: impl Iterator<Item = &'a Arc<ClassDef>>,
    ) -> usize {
        let mut invoked = 0;
        for level in levels {
            let Some(function) = level.own_method(name) else {
                continue;
            };
            invoked += 1;
            if let Err(err) = self.invoke(level, function, Some(id), args) {
                debug!(class = %level.path(), function = name, error = %err, "multilevel call failed");
            }
        }
        invoked
    }

    /// Deliver a notification to every level defining `_notification`,
    /// most-derived first. Placeholders ignore notifications.
    pub fn notification(&mut self, id: InstanceId, what: i64) {
        self.call_multilevel(id, NOTIFICATION, &[Variant::Int(what)]);
    }

    /// Check if any level defines `name`
    pub fn has_method(&self, id: InstanceId, name: &str) -> bool {
        self.instances
            .get(&id)
            .map_or(false, |i| i.definition().find_method(name).is_some())
    }

    /// Every function on every level, most-derived first. Overridden names
    /// appear once per defining level.
    pub fn method_list(&self, id: InstanceId) -> Vec<MethodInfo> {
        let Some(instance) = self.instances.get(&id) else {
            return Vec::new();
        };
        instance
            .definition()
            .levels()
            .flat_map(|level| {
                level.own_methods().map(move |f| MethodInfo {
                    name: f.name().to_string(),
                    class: level.path().to_string(),
                    argument_count: f.argument_count(),
                    default_argument_count: f.default_argument_count(),
                    is_static: f.is_static(),
                })
            })
            .collect()
    }

    // ========================================================================
    // Class-level access
    // ========================================================================

    /// Call a function without an instance. Non-static functions still run
    /// but a warning is logged.
    pub fn call_static(
        &mut self,
        def: &Arc<ClassDef>,
        name: &str,
        args: &[Variant],
    ) -> Result<Variant, CallError> {
        let (level, function) = def
            .find_method(name)
            .ok_or_else(|| CallError::InvalidMethod(name.to_string()))?;
        if !function.is_static() {
            warn!(class = %level.path(), function = name, "can't call non-static function from a static context");
        }
        self.invoke(level, function, None, args)
    }

    /// Look up a constant or nested class through the chain
    pub fn class_get(&self, def: &Arc<ClassDef>, name: &str) -> Option<ClassMember> {
        def.levels().find_map(|level| {
            if let Some(value) = level.own_constant(name) {
                return Some(ClassMember::Constant(value.clone()));
            }
            level
                .subclass(name)
                .map(|sub| ClassMember::Subclass(sub.clone()))
        })
    }
}
