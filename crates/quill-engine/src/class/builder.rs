//! Building class definitions from loader descriptions
//!
//! The loader (out of scope here) turns source into a [`ClassDescription`].
//! [`build`] validates it against its resolved base and produces an
//! immutable [`ClassDef`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use quill_sdk::{Variant, VariantType};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::definition::{ClassDef, DefinitionId, MemberSlot};
use super::native::{NativeClassDb, ROOT_NATIVE_CLASS};
use crate::error::BuildError;
use crate::function::ScriptFunction;
use crate::property::SignalInfo;

/// One declared member
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDecl {
    /// Member name
    pub name: String,
    /// Declared type (`Nil` means untyped)
    pub value_type: VariantType,
    /// Initial value; the type's zero value when absent
    pub default: Option<Variant>,
    /// Getter function name
    pub getter: Option<String>,
    /// Setter function name
    pub setter: Option<String>,
}

impl MemberDecl {
    /// Untyped member without default or accessors
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: VariantType::Nil,
            default: None,
            getter: None,
            setter: None,
        }
    }

    /// Set the declared type
    pub fn typed(mut self, value_type: VariantType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Set the initial value
    pub fn default_value(mut self, value: impl Into<Variant>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Route reads through a function
    pub fn getter(mut self, method: impl Into<String>) -> Self {
        self.getter = Some(method.into());
        self
    }

    /// Route writes through a function
    pub fn setter(mut self, method: impl Into<String>) -> Self {
        self.setter = Some(method.into());
        self
    }
}

/// Parsed description of one script class, as produced by a loader
#[derive(Clone, Default)]
pub struct ClassDescription {
    /// Source path (ignored for nested classes, which take their owner's)
    pub path: String,
    /// Class name; defaults to the path for top-level classes
    pub name: String,
    /// Runs in tooling contexts
    pub tool: bool,
    /// Path of the base script class
    pub base: Option<String>,
    /// Native class instances attach to (inherited from `base` when absent)
    pub native_base: Option<String>,
    /// Members in declared order
    pub members: Vec<MemberDecl>,
    /// Constants in declared order
    pub constants: Vec<(String, Variant)>,
    /// Functions in declared order
    pub methods: Vec<Arc<dyn ScriptFunction>>,
    /// Nested classes
    pub subclasses: Vec<ClassDescription>,
    /// Declared signals
    pub signals: Vec<SignalInfo>,
}

impl ClassDescription {
    /// Top-level class at `path`
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: path.clone(),
            path,
            ..Self::default()
        }
    }

    /// Nested class called `name`
    pub fn nested(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the base script class
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Set the native base class
    pub fn native(mut self, native_base: impl Into<String>) -> Self {
        self.native_base = Some(native_base.into());
        self
    }

    /// Mark as a tool class
    pub fn tool(mut self, tool: bool) -> Self {
        self.tool = tool;
        self
    }

    /// Add a member
    pub fn member(mut self, decl: MemberDecl) -> Self {
        self.members.push(decl);
        self
    }

    /// Add an untyped member with an initial value
    pub fn var(self, name: impl Into<String>, default: impl Into<Variant>) -> Self {
        self.member(MemberDecl::new(name).default_value(default))
    }

    /// Add a constant
    pub fn constant(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.constants.push((name.into(), value.into()));
        self
    }

    /// Add a function
    pub fn method(mut self, function: impl ScriptFunction + 'static) -> Self {
        self.methods.push(Arc::new(function));
        self
    }

    /// Add a nested class
    pub fn subclass(mut self, desc: ClassDescription) -> Self {
        self.subclasses.push(desc);
        self
    }

    /// Declare a signal
    pub fn signal(mut self, name: impl Into<String>, arguments: &[&str]) -> Self {
        self.signals.push(SignalInfo {
            name: name.into(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    /// Script classes this description builds against: its own base and
    /// the bases of its nested classes, without duplicates
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = Vec::new();
        self.collect_dependencies(&self.path, &mut deps);
        deps
    }

    fn collect_dependencies<'a>(&'a self, owner: &str, deps: &mut Vec<&'a str>) {
        if let Some(base) = self.base.as_deref() {
            if base != owner && !deps.contains(&base) {
                deps.push(base);
            }
        }
        for sub in &self.subclasses {
            sub.collect_dependencies(owner, deps);
        }
    }
}

impl std::fmt::Debug for ClassDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescription")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("base", &self.base)
            .field("native_base", &self.native_base)
            .field("members", &self.members)
            .field("methods", &self.methods.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("subclasses", &self.subclasses)
            .finish()
    }
}

/// Build a definition.
///
/// `resolve` maps a base path to the definition currently installed (or
/// staged) under it.
pub fn build(
    desc: &ClassDescription,
    resolve: &dyn Fn(&str) -> Option<Arc<ClassDef>>,
    natives: &NativeClassDb,
) -> Result<Arc<ClassDef>, BuildError> {
    let name = if desc.name.is_empty() {
        desc.path.clone()
    } else {
        desc.name.clone()
    };
    build_at(desc, &desc.path, name, resolve, natives)
}

fn build_at(
    desc: &ClassDescription,
    path: &str,
    name: String,
    resolve: &dyn Fn(&str) -> Option<Arc<ClassDef>>,
    natives: &NativeClassDb,
) -> Result<Arc<ClassDef>, BuildError> {
    // Base
    let base = match &desc.base {
        None => None,
        Some(base_path) if base_path == path => {
            return Err(BuildError::CyclicInheritance {
                class: path.to_string(),
                chain: format!("{} -> {}", path, path),
            });
        }
        Some(base_path) => {
            let base = resolve(base_path).ok_or_else(|| BuildError::UnresolvedBase {
                class: path.to_string(),
                base: base_path.clone(),
            })?;
            if base.inherits_path(path) {
                let mut chain = vec![path.to_string()];
                chain.extend(base.levels().map(|level| level.path.clone()));
                if let Some(pos) = chain.iter().skip(1).position(|p| p == path) {
                    chain.truncate(pos + 2);
                }
                return Err(BuildError::CyclicInheritance {
                    class: path.to_string(),
                    chain: chain.join(" -> "),
                });
            }
            Some(base)
        }
    };

    // Native base
    let native_base = match (&base, &desc.native_base) {
        (Some(base), Some(declared)) if declared != &base.native_base => {
            return Err(BuildError::NativeBaseMismatch {
                class: path.to_string(),
                expected: base.native_base.clone(),
                found: declared.clone(),
            });
        }
        (Some(base), _) => base.native_base.clone(),
        (None, declared) => {
            let native = declared
                .clone()
                .unwrap_or_else(|| ROOT_NATIVE_CLASS.to_string());
            if !natives.contains(&native) {
                return Err(BuildError::UnresolvedNativeBase {
                    class: path.to_string(),
                    native,
                });
            }
            native
        }
    };

    // Functions
    let mut methods: FxHashMap<String, Arc<dyn ScriptFunction>> = FxHashMap::default();
    let mut method_order = Vec::with_capacity(desc.methods.len());
    for function in &desc.methods {
        let fname = function.name().to_string();
        if methods.contains_key(&fname) {
            return Err(BuildError::DuplicateMethod {
                class: path.to_string(),
                method: fname,
            });
        }
        methods.insert(fname.clone(), function.clone());
        method_order.push(fname);
    }

    // Members: inherited slots keep their indices, own slots follow
    let (mut member_slots, mut member_order) = match &base {
        Some(base) => (base.member_slots.clone(), base.member_order.clone()),
        None => (FxHashMap::default(), Vec::new()),
    };
    let mut own_members = Vec::with_capacity(desc.members.len());
    for decl in &desc.members {
        if member_slots.contains_key(&decl.name) {
            return Err(BuildError::DuplicateMember {
                class: path.to_string(),
                member: decl.name.clone(),
            });
        }
        for accessor in [&decl.getter, &decl.setter].into_iter().flatten() {
            let found = methods.contains_key(accessor)
                || base
                    .as_ref()
                    .map_or(false, |b| b.find_method(accessor).is_some());
            if !found {
                return Err(BuildError::MalformedAccessor {
                    class: path.to_string(),
                    member: decl.name.clone(),
                    method: accessor.clone(),
                });
            }
        }
        let slot = MemberSlot {
            index: member_order.len(),
            value_type: decl.value_type,
            getter: decl.getter.clone(),
            setter: decl.setter.clone(),
            default: decl
                .default
                .clone()
                .unwrap_or_else(|| decl.value_type.default_value()),
        };
        member_slots.insert(decl.name.clone(), slot);
        member_order.push(decl.name.clone());
        own_members.push(decl.name.clone());
    }

    // Constants
    let mut constants = FxHashMap::default();
    let mut constant_order = Vec::with_capacity(desc.constants.len());
    for (cname, value) in &desc.constants {
        if constants.insert(cname.clone(), value.clone()).is_some() {
            return Err(BuildError::DuplicateConstant {
                class: path.to_string(),
                constant: cname.clone(),
            });
        }
        constant_order.push(cname.clone());
    }

    // Nested classes share the owner's path
    let mut subclasses = BTreeMap::new();
    for sub in &desc.subclasses {
        if subclasses.contains_key(&sub.name) {
            return Err(BuildError::DuplicateSubclass {
                class: path.to_string(),
                name: sub.name.clone(),
            });
        }
        let built = build_at(sub, path, sub.name.clone(), resolve, natives)?;
        subclasses.insert(sub.name.clone(), built);
    }

    let ancestors = match &base {
        Some(base) => base.levels().cloned().collect(),
        None => Vec::new(),
    };

    let def = Arc::new(ClassDef {
        id: DefinitionId::next(),
        path: path.to_string(),
        name,
        tool: desc.tool,
        base,
        ancestors,
        native_base,
        member_slots,
        member_order,
        own_members,
        constants,
        constant_order,
        subclasses,
        methods,
        method_order,
        signals: desc.signals.clone(),
        instances: Mutex::new(FxHashSet::default()),
        placeholders: Mutex::new(FxHashSet::default()),
    });

    debug!(
        path = %def.path,
        name = %def.name,
        id = def.id.as_u64(),
        members = def.member_count(),
        "built class definition"
    );
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnMethod;

    fn noop(name: &str) -> FnMethod {
        FnMethod::new(name, 0, |_, _| Ok(Variant::Nil))
    }

    fn natives() -> NativeClassDb {
        let mut db = NativeClassDb::new();
        db.register("Node", "Object").unwrap();
        db
    }

    fn build_one(desc: &ClassDescription) -> Result<Arc<ClassDef>, BuildError> {
        build(desc, &|_| None, &natives())
    }

    #[test]
    fn test_slots_are_dense_and_inherited_first() {
        let base = build_one(
            &ClassDescription::new("res://base.qs")
                .native("Node")
                .var("x", 1)
                .var("y", 2),
        )
        .unwrap();
        let resolve = |p: &str| (p == "res://base.qs").then(|| base.clone());
        let derived = build(
            &ClassDescription::new("res://derived.qs")
                .extends("res://base.qs")
                .var("z", 3),
            &resolve,
            &natives(),
        )
        .unwrap();

        assert_eq!(derived.member_names(), &["x", "y", "z"]);
        assert_eq!(derived.member_slot("z").unwrap().index, 2);
        assert_eq!(derived.own_members(), &["z"]);
        assert_eq!(derived.native_base(), "Node");
        assert_eq!(derived.ancestors().len(), 1);
        assert_eq!(
            derived.default_values(),
            vec![Variant::Int(1), Variant::Int(2), Variant::Int(3)]
        );
    }

    #[test]
    fn test_typed_member_default() {
        let def = build_one(
            &ClassDescription::new("res://t.qs")
                .member(MemberDecl::new("hp").typed(VariantType::Int)),
        )
        .unwrap();
        assert_eq!(def.member_slot("hp").unwrap().default, Variant::Int(0));
        assert_eq!(def.native_base(), "Object");
    }

    #[test]
    fn test_duplicate_member() {
        let err = build_one(&ClassDescription::new("res://d.qs").var("a", 1).var("a", 2))
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMember { member, .. } if member == "a"));
    }

    #[test]
    fn test_duplicate_method_and_constant() {
        let err = build_one(
            &ClassDescription::new("res://d.qs")
                .method(noop("f"))
                .method(noop("f")),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMethod { .. }));

        let err = build_one(
            &ClassDescription::new("res://d.qs")
                .constant("K", 1)
                .constant("K", 2),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateConstant { .. }));
    }

    #[test]
    fn test_unresolved_base_and_native() {
        let err = build_one(&ClassDescription::new("res://a.qs").extends("res://nope.qs"))
            .unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedBase { .. }));

        let err = build_one(&ClassDescription::new("res://a.qs").native("Spatial")).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedNativeBase { .. }));
    }

    #[test]
    fn test_self_base_is_cyclic() {
        let err = build_one(&ClassDescription::new("res://a.qs").extends("res://a.qs"))
            .unwrap_err();
        assert!(matches!(err, BuildError::CyclicInheritance { .. }));
    }

    #[test]
    fn test_cycle_through_existing_generation() {
        // res://b.qs currently extends res://a.qs; rebuilding a.qs on top of b.qs loops
        let a = build_one(&ClassDescription::new("res://a.qs")).unwrap();
        let resolve_a = |p: &str| (p == "res://a.qs").then(|| a.clone());
        let b = build(
            &ClassDescription::new("res://b.qs").extends("res://a.qs"),
            &resolve_a,
            &natives(),
        )
        .unwrap();
        let resolve_b = |p: &str| (p == "res://b.qs").then(|| b.clone());
        let err = build(
            &ClassDescription::new("res://a.qs").extends("res://b.qs"),
            &resolve_b,
            &natives(),
        )
        .unwrap_err();
        match err {
            BuildError::CyclicInheritance { chain, .. } => {
                assert_eq!(chain, "res://a.qs -> res://b.qs -> res://a.qs")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_accessors_must_exist() {
        let err = build_one(
            &ClassDescription::new("res://a.qs")
                .member(MemberDecl::new("hp").setter("set_hp")),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::MalformedAccessor { method, .. } if method == "set_hp"));

        let ok = build_one(
            &ClassDescription::new("res://a.qs")
                .member(MemberDecl::new("hp").setter("set_hp"))
                .method(FnMethod::new("set_hp", 1, |_, _| Ok(Variant::Nil))),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_native_mismatch() {
        let base = build_one(&ClassDescription::new("res://base.qs").native("Node")).unwrap();
        let resolve = |_: &str| Some(base.clone());
        let err = build(
            &ClassDescription::new("res://d.qs")
                .extends("res://base.qs")
                .native("Object"),
            &resolve,
            &natives(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::NativeBaseMismatch { .. }));
    }

    #[test]
    fn test_nested_classes_take_owner_path() {
        let def = build_one(
            &ClassDescription::new("res://outer.qs")
                .constant("LIMIT", 10)
                .subclass(ClassDescription::nested("Inner").var("v", 0)),
        )
        .unwrap();
        let inner = def.subclass("Inner").unwrap();
        assert_eq!(inner.path(), "res://outer.qs");
        assert_eq!(inner.name(), "Inner");
        assert_eq!(def.find_constant("LIMIT"), Some(&Variant::Int(10)));
    }

    #[test]
    fn test_signals() {
        let base = build_one(&ClassDescription::new("res://base.qs").signal("hit", &["damage"]))
            .unwrap();
        let resolve = |_: &str| Some(base.clone());
        let derived = build(
            &ClassDescription::new("res://d.qs")
                .extends("res://base.qs")
                .signal("died", &[]),
            &resolve,
            &natives(),
        )
        .unwrap();
        assert!(derived.has_signal("hit"));
        assert!(derived.has_signal("died"));
        assert!(!base.has_signal("died"));
        let names: Vec<_> = derived.signal_list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["died", "hit"]);
    }

    #[test]
    fn test_dependencies_include_nested_bases() {
        let desc = ClassDescription::new("res://c.qs")
            .extends("res://a.qs")
            .subclass(ClassDescription::nested("Inner").extends("res://b.qs"))
            .subclass(
                ClassDescription::nested("Other")
                    .extends("res://a.qs")
                    .subclass(ClassDescription::nested("Deep").extends("res://d.qs")),
            )
            .subclass(ClassDescription::nested("Plain"));
        assert_eq!(
            desc.dependencies(),
            vec!["res://a.qs", "res://b.qs", "res://d.qs"]
        );
        assert!(ClassDescription::new("res://e.qs").dependencies().is_empty());
    }
}
