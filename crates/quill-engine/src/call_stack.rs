//! Call-stack tracker for debugging and profiling
//!
//! A fixed-capacity LIFO of the script invocations currently active on the
//! main execution context. The dispatcher pushes a [`CallFrame`] around every
//! invocation; the debugger queries it for stack traces.
//!
//! Only the thread that created the tracker records frames. Pushes and pops
//! from any other thread are accepted and ignored: instrumentation is
//! single-threaded and never synchronizes.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use quill_sdk::Variant;

use crate::class::ClassDef;
use crate::error::CallStackError;
use crate::function::ScriptFunction;
use crate::instance::InstanceId;

/// Live execution cursors of one invocation.
///
/// Shared between the running body (through its call context) and the
/// tracker frame, so stack traces see the current line.
#[derive(Debug, Default)]
pub struct ExecState {
    stack: Mutex<Vec<Variant>>,
    ip: AtomicUsize,
    line: AtomicU32,
}

impl ExecState {
    /// Create empty cursors
    pub fn new() -> Self {
        Self::default()
    }

    /// Current line
    pub fn line(&self) -> u32 {
        self.line.load(Ordering::Relaxed)
    }

    /// Set the current line
    pub fn set_line(&self, line: u32) {
        self.line.store(line, Ordering::Relaxed);
    }

    /// Current instruction pointer
    pub fn ip(&self) -> usize {
        self.ip.load(Ordering::Relaxed)
    }

    /// Set the instruction pointer
    pub fn set_ip(&self, ip: usize) {
        self.ip.store(ip, Ordering::Relaxed);
    }

    /// Push onto the value stack
    pub fn push(&self, value: Variant) {
        self.stack.lock().push(value);
    }

    /// Pop from the value stack
    pub fn pop(&self) -> Option<Variant> {
        self.stack.lock().pop()
    }

    /// Copy of the value stack, bottom first
    pub fn values(&self) -> Vec<Variant> {
        self.stack.lock().clone()
    }
}

/// One active invocation
#[derive(Clone)]
pub struct CallFrame {
    /// Value stack and cursors
    pub state: Arc<ExecState>,
    /// Function being executed
    pub function: Arc<dyn ScriptFunction>,
    /// Class level defining the function
    pub class: Arc<ClassDef>,
    /// Receiving instance (`None` for static calls)
    pub instance: Option<InstanceId>,
}

impl std::fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFrame")
            .field("function", &self.function.name())
            .field("class", &self.class.path())
            .field("instance", &self.instance)
            .field("line", &self.state.line())
            .finish()
    }
}

/// One stack-trace entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo {
    /// Source path of the defining class
    pub file: String,
    /// Function name
    pub func: String,
    /// Line cursor at the time of the snapshot
    pub line: u32,
}

/// Fixed-capacity tracker of active invocations
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    capacity: usize,
    main_thread: ThreadId,
}

impl CallStack {
    /// Create a tracker owned by the calling thread
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity.min(64)),
            capacity,
            main_thread: thread::current().id(),
        }
    }

    /// Whether the calling thread is the one that records frames
    #[inline]
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    /// Record a frame.
    ///
    /// At capacity the frame is rejected and the depth is left unchanged.
    pub fn push(&mut self, frame: CallFrame) -> Result<(), CallStackError> {
        if !self.is_main_thread() {
            return Ok(());
        }
        if self.frames.len() >= self.capacity {
            return Err(CallStackError::Overflow {
                capacity: self.capacity,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Remove the most recent frame
    pub fn pop(&mut self) -> Result<(), CallStackError> {
        if !self.is_main_thread() {
            return Ok(());
        }
        self.frames.pop().map(|_| ()).ok_or(CallStackError::Underflow)
    }

    /// Number of recorded frames
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Configured capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if no frame is recorded
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at `level`, where level 0 is the most recent call
    pub fn frame(&self, level: usize) -> Option<&CallFrame> {
        let len = self.frames.len();
        if level >= len {
            return None;
        }
        self.frames.get(len - 1 - level)
    }

    /// Stack trace, most recent call first
    pub fn info(&self) -> Vec<StackInfo> {
        self.frames
            .iter()
            .rev()
            .map(|frame| StackInfo {
                file: frame.class.path().to_string(),
                func: frame.function.name().to_string(),
                line: frame.state.line(),
            })
            .collect()
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
