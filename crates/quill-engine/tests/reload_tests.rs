//! Hot reload of loaded classes and their live instances

#![cfg(feature = "hot-reload")]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::*;
use parking_lot::Mutex;
use quill_engine::{
    BuildError, ClassDescription, FnMethod, InstanceId, MemberDecl, ReloadError, ReloadMode,
    ScriptRuntime,
};
use quill_sdk::{ObjectId, Variant};

fn base() -> ClassDescription {
    ClassDescription::new("res://base.qs").var("x", 0)
}

fn mid() -> ClassDescription {
    ClassDescription::new("res://mid.qs")
        .extends("res://base.qs")
        .var("m", 1)
}

fn leaf() -> ClassDescription {
    ClassDescription::new("res://leaf.qs")
        .extends("res://mid.qs")
        .var("l", 2)
}

fn load_chain(rt: &mut ScriptRuntime) {
    rt.load_class(base()).unwrap();
    rt.load_class(mid()).unwrap();
    rt.load_class(leaf()).unwrap();
}

fn attach_to(rt: &mut ScriptRuntime, path: &str) -> (ObjectId, InstanceId) {
    let def = rt.class(path).unwrap();
    let (object, _) = spawn_object(rt, "Object");
    let id = rt.attach(object, &def, &[]).unwrap();
    (object, id)
}

fn position(order: &[String], path: &str) -> usize {
    order.iter().position(|p| p == path).unwrap()
}

#[test]
fn test_base_reload_rebuilds_dependents_in_order() {
    let mut rt = runtime();
    load_chain(&mut rt);
    rt.load_class(ClassDescription::new("res://other.qs")).unwrap();
    let other_id = rt.class("res://other.qs").unwrap().id();

    let report = rt
        .reload_class("res://base.qs", base().var("y", 3), ReloadMode::Soft)
        .unwrap();
    assert_eq!(
        report.rebuilt,
        vec!["res://base.qs", "res://mid.qs", "res://leaf.qs"]
    );
    assert_eq!(rt.class("res://other.qs").unwrap().id(), other_id);

    let leaf = rt.class("res://leaf.qs").unwrap();
    assert!(leaf.member_slot("y").is_some());
    assert!(Arc::ptr_eq(
        leaf.base().unwrap().base().unwrap(),
        &rt.class("res://base.qs").unwrap()
    ));
}

#[test]
fn test_reload_all_puts_bases_first() {
    let mut rt = runtime();
    rt.load_class(ClassDescription::new("res://a_other.qs")).unwrap();
    load_chain(&mut rt);

    let report = rt.reload_all(ReloadMode::Soft).unwrap();
    assert_eq!(report.rebuilt.len(), 4);
    assert!(position(&report.rebuilt, "res://base.qs") < position(&report.rebuilt, "res://mid.qs"));
    assert!(position(&report.rebuilt, "res://mid.qs") < position(&report.rebuilt, "res://leaf.qs"));
}

#[test]
fn test_soft_reload_keeps_values_across_layout_change() {
    let mut rt = runtime();
    load_chain(&mut rt);
    let (object, id) = attach_to(&mut rt, "res://leaf.qs");
    assert!(rt.set(id, "x", Variant::Int(5)));
    assert!(rt.set(id, "l", Variant::Int(8)));

    let new_base = ClassDescription::new("res://base.qs").var("a", 0).var("x", 0);
    let report = rt.reload_class("res://base.qs", new_base, ReloadMode::Soft).unwrap();

    assert_eq!(report.restored, vec![object]);
    assert_eq!(rt.script_instance(object), Some(id));
    assert_eq!(rt.get(id, "x"), Some(Variant::Int(5)));
    assert_eq!(rt.get(id, "a"), Some(Variant::Int(0)));
    assert_eq!(rt.get(id, "l"), Some(Variant::Int(8)));

    let instance = rt.instance(id).unwrap();
    let leaf = rt.class("res://leaf.qs").unwrap();
    assert_eq!(instance.definition().id(), leaf.id());
    assert_eq!(instance.values().len(), leaf.member_count());
}

#[test]
fn test_hard_reload_keeps_values_across_layout_change() {
    let mut rt = runtime();
    load_chain(&mut rt);
    let (object, id) = attach_to(&mut rt, "res://leaf.qs");
    assert!(rt.set(id, "x", Variant::Int(5)));

    let old_def = rt.class("res://leaf.qs").unwrap();
    let new_base = ClassDescription::new("res://base.qs").var("a", 0).var("x", 0);
    let report = rt.reload_class("res://base.qs", new_base, ReloadMode::Hard).unwrap();
    assert_eq!(report.restored, vec![object]);
    assert!(report.failed.is_empty());

    let new_id = rt.script_instance(object).unwrap();
    assert_ne!(new_id, id);
    assert!(rt.instance(id).is_none());
    assert_eq!(old_def.instance_count(), 0);
    assert_eq!(rt.get(new_id, "x"), Some(Variant::Int(5)));
    assert_eq!(rt.get(new_id, "a"), Some(Variant::Int(0)));
}

#[test]
fn test_repeated_reload_is_idempotent() {
    for mode in [ReloadMode::Soft, ReloadMode::Hard] {
        let mut rt = runtime();
        load_chain(&mut rt);
        let (object, id) = attach_to(&mut rt, "res://leaf.qs");
        rt.set(id, "x", Variant::from("five"));
        rt.set(id, "m", Variant::Float(1.5));
        let before = rt.property_state(id);

        rt.reload_all(mode).unwrap();
        rt.reload_all(mode).unwrap();

        let id = rt.script_instance(object).unwrap();
        assert_eq!(rt.property_state(id), before, "{:?}", mode);
    }
}

#[test]
fn test_failed_build_changes_nothing() {
    let mut rt = runtime();
    load_chain(&mut rt);
    let (object, id) = attach_to(&mut rt, "res://leaf.qs");
    rt.set(id, "x", Variant::Int(5));
    let ids: Vec<_> = ["res://base.qs", "res://mid.qs", "res://leaf.qs"]
        .iter()
        .map(|p| rt.class(p).unwrap().id())
        .collect();

    // `l` collides with the leaf's own member
    let broken = ClassDescription::new("res://base.qs").var("x", 0).var("l", 0);
    let err = rt
        .reload_class("res://base.qs", broken, ReloadMode::Hard)
        .unwrap_err();
    assert!(matches!(
        err,
        ReloadError::Build { ref path, source: BuildError::DuplicateMember { .. } } if path == "res://leaf.qs"
    ));

    let after: Vec<_> = ["res://base.qs", "res://mid.qs", "res://leaf.qs"]
        .iter()
        .map(|p| rt.class(p).unwrap().id())
        .collect();
    assert_eq!(after, ids);
    assert_eq!(rt.script_instance(object), Some(id));
    assert_eq!(rt.get(id, "x"), Some(Variant::Int(5)));
    assert_eq!(rt.classes().description("res://base.qs").unwrap().members.len(), 1);
}

#[test]
fn test_cyclic_reload_changes_nothing() {
    let mut rt = runtime();
    load_chain(&mut rt);
    let base_id = rt.class("res://base.qs").unwrap().id();

    let err = rt
        .reload_class("res://base.qs", base().extends("res://leaf.qs"), ReloadMode::Soft)
        .unwrap_err();
    assert!(matches!(err, ReloadError::CyclicDependency(_)));
    assert_eq!(rt.class("res://base.qs").unwrap().id(), base_id);
    assert!(rt.classes().description("res://base.qs").unwrap().base.is_none());
}

#[test]
fn test_unknown_class() {
    let mut rt = runtime();
    let err = rt
        .reload_class("res://missing.qs", ClassDescription::default(), ReloadMode::Soft)
        .unwrap_err();
    assert_eq!(err, ReloadError::UnknownClass("res://missing.qs".into()));
}

#[test]
fn test_hard_restore_goes_through_setters() {
    let mut rt = runtime();
    let calls = log();
    let sink = calls.clone();
    let desc = ClassDescription::new("res://hp.qs")
        .member(MemberDecl::new("hp").default_value(1).setter("set_hp"))
        .method(FnMethod::new("set_hp", 1, move |ctx, args| {
            sink.lock().push(format!("set_hp({})", args[0]));
            ctx.set_member("hp", args[0].clone())?;
            Ok(Variant::Nil)
        }));
    rt.load_class(desc).unwrap();
    let (object, id) = attach_to(&mut rt, "res://hp.qs");
    assert!(rt.set(id, "hp", Variant::Int(7)));
    assert_eq!(entries(&calls), vec!["set_hp(7)"]);

    rt.reload_all(ReloadMode::Hard).unwrap();
    assert_eq!(entries(&calls), vec!["set_hp(7)", "set_hp(7)"]);
    let id = rt.script_instance(object).unwrap();
    assert_eq!(rt.get(id, "hp"), Some(Variant::Int(7)));

    // Soft reload moves values without running code
    rt.reload_all(ReloadMode::Soft).unwrap();
    assert_eq!(entries(&calls).len(), 2);
    assert_eq!(rt.get(id, "hp"), Some(Variant::Int(7)));
}

#[test]
fn test_hard_reload_keeps_placeholders() {
    let mut rt = runtime();
    let inits = log();
    rt.load_class(
        ClassDescription::new("res://tool.qs")
            .var("x", 0)
            .method(record("_init", 0, &inits, "init")),
    )
    .unwrap();
    let def = rt.class("res://tool.qs").unwrap();
    let (object, _) = spawn_object(&mut rt, "Object");
    let id = rt.attach_placeholder(object, &def).unwrap();
    assert!(rt.set(id, "x", Variant::Int(5)));

    let report = rt.reload_all(ReloadMode::Hard).unwrap();
    assert_eq!(report.restored, vec![object]);

    let id = rt.script_instance(object).unwrap();
    let instance = rt.instance(id).unwrap();
    assert!(instance.is_placeholder());
    assert_eq!(instance.member("x"), Some(&Variant::Int(5)));
    assert!(entries(&inits).is_empty());
    assert_eq!(rt.class("res://tool.qs").unwrap().placeholder_ids(), vec![id]);
}

#[test]
fn test_owner_destroyed_during_hard_reload_is_skipped() {
    let mut rt = runtime();
    let armed = Arc::new(AtomicBool::new(false));
    let victim: Arc<Mutex<Option<ObjectId>>> = Arc::new(Mutex::new(None));
    let (trigger, target) = (armed.clone(), victim.clone());
    rt.load_class(ClassDescription::new("res://fragile.qs").var("x", 0).method(
        FnMethod::new("_init", 0, move |ctx, _| {
            if trigger.swap(false, Ordering::SeqCst) {
                if let Some(object) = *target.lock() {
                    ctx.runtime().destroy_object(object);
                }
            }
            Ok(Variant::Nil)
        }),
    ))
    .unwrap();

    let (first, _) = attach_to(&mut rt, "res://fragile.qs");
    let (second, _) = attach_to(&mut rt, "res://fragile.qs");
    *victim.lock() = Some(second);
    armed.store(true, Ordering::SeqCst);

    let report = rt.reload_all(ReloadMode::Hard).unwrap();
    assert_eq!(report.restored, vec![first]);
    assert_eq!(report.skipped, vec![second]);
    assert!(report.failed.is_empty());
    assert!(!rt.has_object(second));
    assert_eq!(rt.instance_count(), 1);
}

#[test]
fn test_soft_reload_rebinds_nested_classes() {
    let mut rt = runtime();
    let outer = |inner: Option<ClassDescription>| {
        let desc = ClassDescription::new("res://outer.qs").var("o", 0);
        match inner {
            Some(inner) => desc.subclass(inner),
            None => desc,
        }
    };
    rt.load_class(outer(Some(ClassDescription::nested("Inner").var("v", 1))))
        .unwrap();
    let inner = rt
        .class("res://outer.qs")
        .unwrap()
        .subclass("Inner")
        .unwrap()
        .clone();
    let (object, _) = spawn_object(&mut rt, "Object");
    let id = rt.attach(object, &inner, &[]).unwrap();
    rt.set(id, "v", Variant::Int(9));

    let report = rt
        .reload_class(
            "res://outer.qs",
            outer(Some(ClassDescription::nested("Inner").var("w", 0).var("v", 1))),
            ReloadMode::Soft,
        )
        .unwrap();
    assert_eq!(report.restored, vec![object]);
    let new_inner = rt.class("res://outer.qs").unwrap().subclass("Inner").unwrap().clone();
    assert_eq!(rt.instance(id).unwrap().definition().id(), new_inner.id());
    assert_eq!(rt.get(id, "v"), Some(Variant::Int(9)));
    assert_eq!(rt.get(id, "w"), Some(Variant::Int(0)));
    assert_eq!(inner.instance_count(), 0);

    // Nested class removed: the instance keeps its old definition
    let report = rt
        .reload_class("res://outer.qs", outer(None), ReloadMode::Soft)
        .unwrap();
    assert_eq!(report.skipped, vec![object]);
    assert_eq!(rt.instance(id).unwrap().definition().id(), new_inner.id());
    assert_eq!(rt.get(id, "v"), Some(Variant::Int(9)));
}

#[test]
fn test_hard_reload_reports_removed_nested_class() {
    let mut rt = runtime();
    rt.load_class(ClassDescription::new("res://outer.qs").subclass(ClassDescription::nested("Inner")))
        .unwrap();
    let inner = rt.class("res://outer.qs").unwrap().subclass("Inner").unwrap().clone();
    let (object, _) = spawn_object(&mut rt, "Object");
    rt.attach(object, &inner, &[]).unwrap();

    let report = rt
        .reload_class("res://outer.qs", ClassDescription::new("res://outer.qs"), ReloadMode::Hard)
        .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, object);
    assert_eq!(rt.script_instance(object), None);
}

#[test]
fn test_soft_reload_runs_new_method_bodies() {
    let mut rt = runtime();
    rt.load_class(ClassDescription::new("res://talk.qs").method(returns("speak", 0, "old")))
        .unwrap();
    let (_, id) = attach_to(&mut rt, "res://talk.qs");
    assert_eq!(rt.call(id, "speak", &[]), Ok(Variant::from("old")));

    rt.reload_class(
        "res://talk.qs",
        ClassDescription::new("res://talk.qs").method(returns("speak", 0, "new")),
        ReloadMode::Soft,
    )
    .unwrap();
    assert_eq!(rt.call(id, "speak", &[]), Ok(Variant::from("new")));
}

fn nested_dependent(rt: &mut ScriptRuntime) -> (ObjectId, InstanceId) {
    rt.load_class(ClassDescription::new("res://a.qs").var("x", 0))
        .unwrap();
    rt.load_class(
        ClassDescription::new("res://c.qs")
            .subclass(ClassDescription::nested("Inner").extends("res://a.qs").var("i", 0)),
    )
    .unwrap();
    let inner = rt.class("res://c.qs").unwrap().subclass("Inner").unwrap().clone();
    let (object, _) = spawn_object(rt, "Object");
    let id = rt.attach(object, &inner, &[]).unwrap();
    assert!(rt.set(id, "x", Variant::Int(5)));
    assert!(rt.set(id, "i", Variant::Int(3)));
    (object, id)
}

#[test]
fn test_nested_class_extending_reloaded_base_is_rebuilt() {
    for mode in [ReloadMode::Soft, ReloadMode::Hard] {
        let mut rt = runtime();
        let (object, _) = nested_dependent(&mut rt);

        let report = rt
            .reload_class(
                "res://a.qs",
                ClassDescription::new("res://a.qs").var("x", 0).var("y", 7),
                mode,
            )
            .unwrap();
        assert_eq!(report.rebuilt, vec!["res://a.qs", "res://c.qs"], "{:?}", mode);
        assert_eq!(report.restored, vec![object], "{:?}", mode);

        let inner = rt.class("res://c.qs").unwrap().subclass("Inner").unwrap().clone();
        assert!(Arc::ptr_eq(inner.base().unwrap(), &rt.class("res://a.qs").unwrap()));

        let id = rt.script_instance(object).unwrap();
        assert_eq!(rt.instance(id).unwrap().definition().id(), inner.id());
        assert_eq!(rt.get(id, "y"), Some(Variant::Int(7)), "{:?}", mode);
        assert_eq!(rt.get(id, "x"), Some(Variant::Int(5)), "{:?}", mode);
        assert_eq!(rt.get(id, "i"), Some(Variant::Int(3)), "{:?}", mode);
    }
}

#[test]
fn test_owner_of_dependent_nested_class_builds_after_base() {
    let mut rt = runtime();
    // "res://0.qs" sorts before the base it depends on
    rt.load_class(ClassDescription::new("res://z.qs")).unwrap();
    rt.load_class(
        ClassDescription::new("res://0.qs")
            .subclass(ClassDescription::nested("Inner").extends("res://z.qs")),
    )
    .unwrap();

    let report = rt.reload_all(ReloadMode::Soft).unwrap();
    assert_eq!(report.rebuilt, vec!["res://z.qs", "res://0.qs"]);
    let inner = rt.class("res://0.qs").unwrap().subclass("Inner").unwrap().clone();
    assert!(Arc::ptr_eq(inner.base().unwrap(), &rt.class("res://z.qs").unwrap()));
}
