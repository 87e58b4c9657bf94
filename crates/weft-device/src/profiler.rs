//! Thread-local execution profiler.
//!
//! Counters accumulate across every device run on the calling thread until
//! [`clear`]. The debug flags can switch the device into skip-exec mode,
//! where handlers count their work but leave the tile memories and DRAM
//! untouched (micro-op loads excepted — later instructions depend on them).

use std::cell::RefCell;

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Profiler debug flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DebugFlags: u64 {
        /// Count loads/stores/compute ops without executing them.
        const SKIP_EXEC = 1;
    }
}

/// Per-thread counter state.
#[derive(Debug, Default, Serialize)]
pub struct Profiler {
    pub inp_load_bytes: u64,
    pub wgt_load_bytes: u64,
    pub acc_load_bytes: u64,
    pub uop_load_bytes: u64,
    pub out_store_bytes: u64,
    pub gemm_ops: u64,
    pub alu_ops: u64,
    #[serde(skip)]
    pub debug: DebugFlags,
}

impl Profiler {
    pub fn skip_exec(&self) -> bool {
        self.debug.contains(DebugFlags::SKIP_EXEC)
    }

    /// Zero the counters; the debug flags are left as set.
    pub fn clear(&mut self) {
        *self = Profiler {
            debug: self.debug,
            ..Profiler::default()
        };
    }
}

thread_local! {
    static PROFILER: RefCell<Profiler> = RefCell::new(Profiler::default());
}

/// Run `f` against the calling thread's profiler.
pub fn with<R>(f: impl FnOnce(&mut Profiler) -> R) -> R {
    PROFILER.with(|cell| f(&mut cell.borrow_mut()))
}

/// Zero the calling thread's counters.
pub fn clear() {
    with(Profiler::clear)
}

/// Serialized snapshot of the calling thread's counters.
pub fn status() -> String {
    with(|prof| serde_json::to_string_pretty(prof).expect("profiler counters serialize"))
}

/// Replace the calling thread's debug flags.
pub fn set_debug(flags: DebugFlags) {
    with(|prof| prof.debug = flags)
}
