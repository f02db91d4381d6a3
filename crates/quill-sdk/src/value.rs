//! Dynamic values passed through every script boundary
//!
//! Member slots, constants, method arguments and return values are all
//! `Variant`s. The set of types is deliberately small: the core never looks
//! inside values beyond truthiness and type tags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a native host object.
///
/// Assigned by the host; the runtime only uses it as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Variant
// ============================================================================

/// Dynamic value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    /// Absent value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    Array(Vec<Variant>),
    /// String-keyed map
    Dictionary(BTreeMap<String, Variant>),
    /// Reference to a native host object
    Object(ObjectId),
}

impl Variant {
    /// Get the type tag of this value
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Float(_) => VariantType::Float,
            Variant::String(_) => VariantType::String,
            Variant::Array(_) => VariantType::Array,
            Variant::Dictionary(_) => VariantType::Dictionary,
            Variant::Object(_) => VariantType::Object,
        }
    }

    /// Check if this value is `Nil`
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    /// Truthiness used by conditionals and by the `_set` fallback hook.
    ///
    /// `Nil`, `false`, zero, empty strings and empty containers are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Variant::Nil => false,
            Variant::Bool(b) => *b,
            Variant::Int(i) => *i != 0,
            Variant::Float(f) => *f != 0.0,
            Variant::String(s) => !s.is_empty(),
            Variant::Array(a) => !a.is_empty(),
            Variant::Dictionary(d) => !d.is_empty(),
            Variant::Object(_) => true,
        }
    }

    /// Get as boolean if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer if this is an int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(f) => Some(*f),
            Variant::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array slice if this is an array
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as dictionary if this is a dictionary
    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, Variant>> {
        match self {
            Variant::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Get the object ID if this is an object reference
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Variant::Object(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => write!(f, "null"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Float(x) => write!(f, "{}", x),
            Variant::String(s) => write!(f, "{}", s),
            Variant::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Variant::Dictionary(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Variant::Object(id) => write!(f, "[Object:{}]", id.0),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<i64> for Variant {
    fn from(i: i64) -> Self {
        Variant::Int(i)
    }
}

impl From<i32> for Variant {
    fn from(i: i32) -> Self {
        Variant::Int(i as i64)
    }
}

impl From<f64> for Variant {
    fn from(f: f64) -> Self {
        Variant::Float(f)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::String(s.to_string())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::String(s)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(items: Vec<Variant>) -> Self {
        Variant::Array(items)
    }
}

impl From<ObjectId> for Variant {
    fn from(id: ObjectId) -> Self {
        Variant::Object(id)
    }
}

// ============================================================================
// VariantType
// ============================================================================

/// Type tag of a [`Variant`].
///
/// In declarations `Nil` doubles as "any": an untyped member reports `Nil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VariantType {
    /// Nil, or untyped when used in a declaration
    #[default]
    Nil,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Float
    Float,
    /// String
    String,
    /// Array
    Array,
    /// Dictionary
    Dictionary,
    /// Object reference
    Object,
}

impl VariantType {
    /// All type tags, ordered by their numeric index
    pub const ALL: [VariantType; 8] = [
        VariantType::Nil,
        VariantType::Bool,
        VariantType::Int,
        VariantType::Float,
        VariantType::String,
        VariantType::Array,
        VariantType::Dictionary,
        VariantType::Object,
    ];

    /// Numeric index (stable, used by the `type` key of property dictionaries)
    pub fn index(self) -> i64 {
        self as i64
    }

    /// Look up a type tag by numeric index
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Zero value used for typed declarations without an explicit default
    pub fn default_value(self) -> Variant {
        match self {
            VariantType::Nil | VariantType::Object => Variant::Nil,
            VariantType::Bool => Variant::Bool(false),
            VariantType::Int => Variant::Int(0),
            VariantType::Float => Variant::Float(0.0),
            VariantType::String => Variant::String(String::new()),
            VariantType::Array => Variant::Array(Vec::new()),
            VariantType::Dictionary => Variant::Dictionary(BTreeMap::new()),
        }
    }

    /// Get the type name
    pub fn name(self) -> &'static str {
        match self {
            VariantType::Nil => "Nil",
            VariantType::Bool => "bool",
            VariantType::Int => "int",
            VariantType::Float => "float",
            VariantType::String => "String",
            VariantType::Array => "Array",
            VariantType::Dictionary => "Dictionary",
            VariantType::Object => "Object",
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
