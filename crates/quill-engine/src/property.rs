//! Introspection records: properties, methods and signals

use bitflags::bitflags;
use quill_sdk::{Variant, VariantType};

bitflags! {
    /// How a property is used by tooling and by state transfer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyUsage: u32 {
        /// Part of the persisted state; captured by `property_state`
        const STORAGE = 1 << 0;
        /// Shown in inspection tooling
        const EDITOR = 1 << 1;
        /// Declared by a script (as opposed to a dynamic hook)
        const SCRIPT_VARIABLE = 1 << 2;
        /// Usage of a declared member
        const DEFAULT = Self::STORAGE.bits() | Self::EDITOR.bits();
    }
}

impl Default for PropertyUsage {
    fn default() -> Self {
        PropertyUsage::DEFAULT
    }
}

/// One enumerated property of an instance
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    /// Property name
    pub name: String,
    /// Declared type (`Nil` means untyped)
    pub value_type: VariantType,
    /// Default value
    pub default: Variant,
    /// Usage flags
    pub usage: PropertyUsage,
}

impl PropertyInfo {
    /// Parse one entry returned by a `_get_property_list` hook.
    ///
    /// Expects a dictionary with a string `name`, an integer `type` and
    /// optionally an integer `usage`. Anything else yields `None`.
    pub fn from_dictionary(entry: &Variant) -> Option<Self> {
        let dict = entry.as_dictionary()?;
        let name = dict.get("name")?.as_str()?.to_string();
        if name.is_empty() {
            return None;
        }
        let value_type = VariantType::from_index(dict.get("type")?.as_int()?)?;
        let usage = match dict.get("usage") {
            None => PropertyUsage::DEFAULT,
            Some(v) => PropertyUsage::from_bits_truncate(u32::try_from(v.as_int()?).ok()?),
        };
        Some(Self {
            name,
            default: value_type.default_value(),
            value_type,
            usage,
        })
    }
}

/// One function visible on an instance or class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Function name
    pub name: String,
    /// Path of the class level that defines it
    pub class: String,
    /// Maximum number of arguments
    pub argument_count: usize,
    /// Number of trailing arguments with defaults
    pub default_argument_count: usize,
    /// Callable without an instance
    pub is_static: bool,
}

/// A declared signal and its argument names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalInfo {
    /// Signal name
    pub name: String,
    /// Argument names in order
    pub arguments: Vec<String>,
}
