//! Per-function profiling counters
//!
//! Functions are keyed by `"<path>::<function>"`. Self time excludes time
//! spent in nested script calls.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counters of one function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionProfile {
    /// Calls since profiling started
    pub call_count: u64,
    /// Time in the body excluding nested calls
    pub self_time: Duration,
    /// Time in the body including nested calls
    pub total_time: Duration,
    /// Calls during the current frame
    pub frame_call_count: u64,
    /// Self time during the current frame
    pub frame_self_time: Duration,
    /// Total time during the current frame
    pub frame_total_time: Duration,
    /// Calls during the last completed frame
    pub last_frame_call_count: u64,
    /// Self time during the last completed frame
    pub last_frame_self_time: Duration,
    /// Total time during the last completed frame
    pub last_frame_total_time: Duration,
}

/// One row of profiling output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingInfo {
    /// `"<path>::<function>"`
    pub signature: String,
    /// Number of calls
    pub call_count: u64,
    /// Self time
    pub self_time: Duration,
    /// Total time
    pub total_time: Duration,
}

#[derive(Debug)]
struct ActiveCall {
    signature: String,
    start: Instant,
    child_time: Duration,
}

/// Profiler state owned by the runtime
#[derive(Debug, Default)]
pub struct Profiler {
    enabled: bool,
    functions: BTreeMap<String, FunctionProfile>,
    active: Vec<ActiveCall>,
    calls: u64,
}

impl Profiler {
    /// Create a stopped profiler
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every counter and start timing
    pub fn start(&mut self) {
        self.functions.clear();
        self.active.clear();
        self.enabled = true;
    }

    /// Stop timing; counters are kept
    pub fn stop(&mut self) {
        self.enabled = false;
    }

    /// Whether calls are being timed
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Script calls since the last `frame()`, counted even while stopped
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Record entry into a function. Returns true if a matching `exit` is due.
    ///
    /// The signature is only built while profiling is enabled.
    pub fn enter(&mut self, signature: impl FnOnce() -> String) -> bool {
        self.calls += 1;
        if !self.enabled {
            return false;
        }
        self.active.push(ActiveCall {
            signature: signature(),
            start: Instant::now(),
            child_time: Duration::ZERO,
        });
        true
    }

    /// Record exit from the most recently entered function
    pub fn exit(&mut self) {
        let Some(call) = self.active.pop() else {
            return;
        };
        let total = call.start.elapsed();
        let self_time = total.saturating_sub(call.child_time);
        if let Some(parent) = self.active.last_mut() {
            parent.child_time += total;
        }

        let profile = self.functions.entry(call.signature).or_default();
        profile.call_count += 1;
        profile.self_time += self_time;
        profile.total_time += total;
        profile.frame_call_count += 1;
        profile.frame_self_time += self_time;
        profile.frame_total_time += total;
    }

    /// Close the current frame: current-frame counters become last-frame
    /// counters and the per-frame call counter resets
    pub fn frame(&mut self) {
        for profile in self.functions.values_mut() {
            profile.last_frame_call_count = profile.frame_call_count;
            profile.last_frame_self_time = profile.frame_self_time;
            profile.last_frame_total_time = profile.frame_total_time;
            profile.frame_call_count = 0;
            profile.frame_self_time = Duration::ZERO;
            profile.frame_total_time = Duration::ZERO;
        }
        self.calls = 0;
    }

    /// Counters of one function
    pub fn profile(&self, signature: &str) -> Option<&FunctionProfile> {
        self.functions.get(signature)
    }

    /// Accumulated counters, at most `max` entries
    pub fn accumulated(&self, max: usize) -> Vec<ProfilingInfo> {
        self.functions
            .iter()
            .take(max)
            .map(|(signature, p)| ProfilingInfo {
                signature: signature.clone(),
                call_count: p.call_count,
                self_time: p.self_time,
                total_time: p.total_time,
            })
            .collect()
    }

    /// Last-frame counters of functions called during the last frame, at
    /// most `max` entries
    pub fn frame_data(&self, max: usize) -> Vec<ProfilingInfo> {
        self.functions
            .iter()
            .filter(|(_, p)| p.last_frame_call_count > 0)
            .take(max)
            .map(|(signature, p)| ProfilingInfo {
                signature: signature.clone(),
                call_count: p.last_frame_call_count,
                self_time: p.last_frame_self_time,
                total_time: p.last_frame_total_time,
            })
            .collect()
    }
}
