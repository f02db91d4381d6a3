//! Script instances
//!
//! An instance owns one value per slot of its definition and is bound to a
//! native owner. Instances live in the runtime's arena keyed by
//! [`InstanceId`]; a definition only records ids, so dropping an instance is
//! a single removal from its definition's set.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quill_sdk::{ObjectId, Variant};
#[cfg(feature = "hot-reload")]
use rustc_hash::FxHashMap;

use crate::class::ClassDef;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity token of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// One live script object
pub struct Instance {
    id: InstanceId,
    owner: ObjectId,
    definition: Arc<ClassDef>,
    values: Vec<Variant>,
    placeholder: bool,
    /// Name to slot mapping the values were laid out with
    #[cfg(feature = "hot-reload")]
    member_indices_cache: FxHashMap<String, usize>,
}

impl Instance {
    /// Create an instance with default values and register it with its
    /// definition
    pub(crate) fn new(owner: ObjectId, definition: Arc<ClassDef>, placeholder: bool) -> Self {
        let id = InstanceId::next();
        definition.register_instance(id, placeholder);
        Self {
            id,
            owner,
            values: definition.default_values(),
            #[cfg(feature = "hot-reload")]
            member_indices_cache: definition.member_indices(),
            definition,
            placeholder,
        }
    }

    /// Identity token
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Native owner
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Definition this instance is shaped by
    pub fn definition(&self) -> &Arc<ClassDef> {
        &self.definition
    }

    /// Property-only stand-in that never runs script code
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Values by slot index
    pub fn values(&self) -> &[Variant] {
        &self.values
    }

    /// Raw slot value of a member
    pub fn member(&self, name: &str) -> Option<&Variant> {
        let slot = self.definition.member_slot(name)?;
        self.values.get(slot.index)
    }

    /// Members as (name, value) pairs, by slot index
    pub fn members(&self) -> Vec<(String, Variant)> {
        self.definition
            .member_names()
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    pub(crate) fn write_slot(&mut self, index: usize, value: Variant) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Remap values after the definition's layout changed.
    ///
    /// Values move by member name from the cached layout to the current
    /// one; removed members are dropped and new ones take their default.
    #[cfg(feature = "hot-reload")]
    pub fn reload_members(&mut self) {
        let def = &self.definition;
        let mut values = def.default_values();
        for (name, new_index) in def.member_indices() {
            if let Some(old) = self
                .member_indices_cache
                .get(&name)
                .and_then(|&old_index| self.values.get(old_index))
            {
                if let Some(slot) = values.get_mut(new_index) {
                    *slot = old.clone();
                }
            }
        }
        self.values = values;
        self.member_indices_cache = def.member_indices();
    }

    /// Move to a new definition generation, keeping values by name
    #[cfg(feature = "hot-reload")]
    pub(crate) fn rebind(&mut self, definition: Arc<ClassDef>) {
        self.definition.unregister_instance(self.id, self.placeholder);
        definition.register_instance(self.id, self.placeholder);
        self.definition = definition;
        self.reload_members();
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.definition.unregister_instance(self.id, self.placeholder);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("class", &self.definition.path())
            .field("placeholder", &self.placeholder)
            .field("values", &self.values)
            .finish()
    }
}
