//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quill_engine::{CallContext, FnMethod, RuntimeOptions, ScriptRuntime};
use quill_sdk::{
    BuiltinFunctionRegistry, CallError, Debugger, NativeObject, ObjectId, Variant,
};

static NEXT_OBJECT: AtomicU64 = AtomicU64::new(1);

/// Host object that counts attach/detach notifications
pub struct TestObject {
    id: ObjectId,
    class: String,
    pub attached: AtomicUsize,
    pub detached: AtomicUsize,
    pub last_class: Mutex<Option<String>>,
}

impl TestObject {
    pub fn new(class: &str) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId(NEXT_OBJECT.fetch_add(1, Ordering::Relaxed)),
            class: class.to_string(),
            attached: AtomicUsize::new(0),
            detached: AtomicUsize::new(0),
            last_class: Mutex::new(None),
        })
    }

    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

impl NativeObject for TestObject {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn native_class(&self) -> &str {
        &self.class
    }

    fn notify_script_attached(&self, class_path: &str) {
        self.attached.fetch_add(1, Ordering::SeqCst);
        *self.last_class.lock() = Some(class_path.to_string());
    }

    fn notify_script_detached(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Debugger that records every break message
#[derive(Clone, Default)]
pub struct RecordingDebugger {
    pub breaks: Arc<Mutex<Vec<String>>>,
}

impl Debugger for RecordingDebugger {
    fn debug_break(&mut self, error: &str, _can_continue: bool) -> bool {
        self.breaks.lock().push(error.to_string());
        false
    }
}

/// Runtime with `Node` and `Sprite` native classes registered
pub fn runtime() -> ScriptRuntime {
    runtime_with(RuntimeOptions::default())
}

pub fn runtime_with(options: RuntimeOptions) -> ScriptRuntime {
    let mut rt = ScriptRuntime::new(options, Arc::new(BuiltinFunctionRegistry::new())).unwrap();
    rt.natives_mut().register("Node", "Object").unwrap();
    rt.natives_mut().register("Sprite", "Node").unwrap();
    rt
}

/// Register a fresh host object of the given native class
pub fn spawn_object(rt: &mut ScriptRuntime, class: &str) -> (ObjectId, Arc<TestObject>) {
    let object = TestObject::new(class);
    let id = rt.register_object(object.clone());
    (id, object)
}

/// Shared call log
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

/// Method that appends `tag` to `log` and returns nil
pub fn record(name: &str, argc: usize, log: &Log, tag: &str) -> FnMethod {
    let log = log.clone();
    let tag = tag.to_string();
    FnMethod::new(name, argc, move |_, _| {
        log.lock().push(tag.clone());
        Ok(Variant::Nil)
    })
}

/// Method that always returns `value`
pub fn returns(name: &str, argc: usize, value: impl Into<Variant>) -> FnMethod {
    let value = value.into();
    FnMethod::new(name, argc, move |_, _| Ok(value.clone()))
}

/// Method that always fails
pub fn fails(name: &str, argc: usize) -> FnMethod {
    let message = format!("{} failed", name);
    FnMethod::new(name, argc, move |_, _| Err(CallError::Failed(message.clone())))
}

/// Method body that writes its first argument to `member` directly
pub fn store_to(
    member: &'static str,
) -> impl Fn(&mut CallContext<'_>, &[Variant]) -> Result<Variant, CallError> + Send + Sync {
    move |ctx, args| {
        ctx.set_member(member, args[0].clone())?;
        Ok(Variant::Nil)
    }
}
