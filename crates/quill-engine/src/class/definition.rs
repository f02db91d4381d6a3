//! Compiled shape of one script class
//!
//! A `ClassDef` is immutable once built. Reloading produces a new
//! generation (a new [`DefinitionId`]) rather than mutating this one; only
//! the live-instance sets change after construction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quill_sdk::{Variant, VariantType};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::function::ScriptFunction;
use crate::instance::InstanceId;
use crate::property::SignalInfo;

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one definition generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

impl DefinitionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Storage slot of one member
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSlot {
    /// Dense index into the instance value array
    pub index: usize,
    /// Declared type (`Nil` means untyped)
    pub value_type: VariantType,
    /// Function invoked instead of reading the slot
    pub getter: Option<String>,
    /// Function invoked instead of writing the slot
    pub setter: Option<String>,
    /// Value the slot starts with
    pub default: Variant,
}

impl MemberSlot {
    /// Convert `value` to the declared type, or `None` if it does not fit.
    ///
    /// Ints widen to floats; object slots also accept `Nil`.
    pub fn coerce(&self, value: Variant) -> Option<Variant> {
        match (self.value_type, &value) {
            (VariantType::Nil, _) => Some(value),
            (ty, v) if v.get_type() == ty => Some(value),
            (VariantType::Float, Variant::Int(i)) => Some(Variant::Float(*i as f64)),
            (VariantType::Object, Variant::Nil) => Some(value),
            _ => None,
        }
    }
}

/// Class-level lookup result
#[derive(Debug, Clone)]
pub enum ClassMember {
    /// Constant value
    Constant(Variant),
    /// Nested class definition
    Subclass(Arc<ClassDef>),
}

/// Compiled class definition
pub struct ClassDef {
    pub(crate) id: DefinitionId,
    pub(crate) path: String,
    pub(crate) name: String,
    pub(crate) tool: bool,
    pub(crate) base: Option<Arc<ClassDef>>,
    /// Base, base of base, ..., root. Materialized once at build time.
    pub(crate) ancestors: Vec<Arc<ClassDef>>,
    pub(crate) native_base: String,
    /// Every slot including inherited ones
    pub(crate) member_slots: FxHashMap<String, MemberSlot>,
    /// Slot names by index
    pub(crate) member_order: Vec<String>,
    /// Members declared by this level, in declared order
    pub(crate) own_members: Vec<String>,
    pub(crate) constants: FxHashMap<String, Variant>,
    pub(crate) constant_order: Vec<String>,
    pub(crate) subclasses: BTreeMap<String, Arc<ClassDef>>,
    pub(crate) methods: FxHashMap<String, Arc<dyn ScriptFunction>>,
    pub(crate) method_order: Vec<String>,
    pub(crate) signals: Vec<SignalInfo>,
    pub(crate) instances: Mutex<FxHashSet<InstanceId>>,
    pub(crate) placeholders: Mutex<FxHashSet<InstanceId>>,
}

impl ClassDef {
    /// Generation identity
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    /// Source path (nested classes share their owner's)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Class name (the nested name for subclasses, otherwise the path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs in tooling contexts
    pub fn is_tool(&self) -> bool {
        self.tool
    }

    /// Direct base class
    pub fn base(&self) -> Option<&Arc<ClassDef>> {
        self.base.as_ref()
    }

    /// Base chain, nearest first
    pub fn ancestors(&self) -> &[Arc<ClassDef>] {
        &self.ancestors
    }

    /// Resolution levels: this definition followed by its ancestors
    pub fn levels<'a>(self: &'a Arc<Self>) -> impl Iterator<Item = &'a Arc<ClassDef>> + 'a {
        std::iter::once(self).chain(self.ancestors.iter())
    }

    /// Native class instances must derive from
    pub fn native_base(&self) -> &str {
        &self.native_base
    }

    /// Check if `path` names this class or one of its ancestors
    pub fn inherits_path(&self, path: &str) -> bool {
        self.path == path || self.ancestors.iter().any(|a| a.path == path)
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    /// Number of slots (inherited included)
    pub fn member_count(&self) -> usize {
        self.member_order.len()
    }

    /// Slot of a member (inherited included)
    pub fn member_slot(&self, name: &str) -> Option<&MemberSlot> {
        self.member_slots.get(name)
    }

    /// Slot names ordered by index
    pub fn member_names(&self) -> &[String] {
        &self.member_order
    }

    /// Members declared by this level, in declared order
    pub fn own_members(&self) -> &[String] {
        &self.own_members
    }

    /// Snapshot of the name to slot index mapping
    pub fn member_indices(&self) -> FxHashMap<String, usize> {
        self.member_slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.index))
            .collect()
    }

    /// Default values, by slot index
    pub fn default_values(&self) -> Vec<Variant> {
        self.member_order
            .iter()
            .map(|name| {
                self.member_slots
                    .get(name)
                    .map(|slot| slot.default.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Constants, subclasses, methods, signals
    // ------------------------------------------------------------------------

    /// Constant declared by this level
    pub fn own_constant(&self, name: &str) -> Option<&Variant> {
        self.constants.get(name)
    }

    /// Constants declared by this level, in declared order
    pub fn own_constants(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.constant_order
            .iter()
            .filter_map(|name| self.constants.get(name).map(|v| (name.as_str(), v)))
    }

    /// Constant visible from this level (nearest declaration wins)
    pub fn find_constant(self: &Arc<Self>, name: &str) -> Option<&Variant> {
        self.levels().find_map(|level| level.constants.get(name))
    }

    /// Nested class declared by this level
    pub fn subclass(&self, name: &str) -> Option<&Arc<ClassDef>> {
        self.subclasses.get(name)
    }

    /// Nested classes declared by this level, sorted by name
    pub fn subclasses(&self) -> &BTreeMap<String, Arc<ClassDef>> {
        &self.subclasses
    }

    /// Function declared by this level
    pub fn own_method(&self, name: &str) -> Option<&Arc<dyn ScriptFunction>> {
        self.methods.get(name)
    }

    /// Functions declared by this level, in declared order
    pub fn own_methods(&self) -> impl Iterator<Item = &Arc<dyn ScriptFunction>> {
        self.method_order
            .iter()
            .filter_map(|name| self.methods.get(name))
    }

    /// First function named `name` along the chain, with its defining level
    pub fn find_method<'a>(
        self: &'a Arc<Self>,
        name: &str,
    ) -> Option<(&'a Arc<ClassDef>, &'a Arc<dyn ScriptFunction>)> {
        self.levels()
            .find_map(|level| level.methods.get(name).map(|f| (level, f)))
    }

    /// Signals declared by this level
    pub fn signals(&self) -> &[SignalInfo] {
        &self.signals
    }

    /// Check if a signal is declared anywhere along the chain
    pub fn has_signal(self: &Arc<Self>, name: &str) -> bool {
        self.levels()
            .any(|level| level.signals.iter().any(|s| s.name == name))
    }

    /// Every signal along the chain, this level first
    pub fn signal_list(self: &Arc<Self>) -> Vec<SignalInfo> {
        self.levels()
            .flat_map(|level| level.signals.iter().cloned())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Live instances
    // ------------------------------------------------------------------------

    /// Ids of live instances, sorted. The lock is held only while copying.
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.instances.lock().iter().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of live placeholder attachments, sorted
    pub fn placeholder_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.placeholders.lock().iter().copied().collect();
        ids.sort();
        ids
    }

    /// Check if an instance is registered with this definition
    pub fn has_instance(&self, id: InstanceId) -> bool {
        self.instances.lock().contains(&id)
    }

    /// Number of live instances (placeholders excluded)
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    pub(crate) fn register_instance(&self, id: InstanceId, placeholder: bool) {
        if placeholder {
            self.placeholders.lock().insert(id);
        } else {
            self.instances.lock().insert(id);
        }
    }

    pub(crate) fn unregister_instance(&self, id: InstanceId, placeholder: bool) {
        if placeholder {
            self.placeholders.lock().remove(&id);
        } else {
            self.instances.lock().remove(&id);
        }
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.path.as_str()))
            .field("native_base", &self.native_base)
            .field("members", &self.member_order)
            .field("methods", &self.method_order)
            .finish()
    }
}
