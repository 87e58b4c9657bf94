//! Task-level pipeline verifier.
//!
//! Instructions are enqueued in program order onto one of three cores —
//! LOAD (input/weight loads), COMPUTE (GEMM, ALU, FINISH, plus micro-op and
//! accumulator loads) and STORE — connected pairwise by dependency token
//! queues, mirroring the hardware's load→compute→store pipeline.
//! [`TlppVerify::synchronize`] drains the cores, running an instruction
//! only once the tokens demanded by its pop flags are available and
//! depositing tokens for its push flags afterwards. Any schedule it
//! produces is equivalent to a legal serial order; with no flags set it
//! degenerates to strict push order.

use std::collections::VecDeque;

use tracing::trace;
use weft_isa::{DepFlags, Insn, MemoryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Core {
    Load = 0,
    Compute = 1,
    Store = 2,
}

fn core_of(raw: u128) -> Core {
    match Insn::decode(raw) {
        Ok(Insn::Load(op)) => match op.memory_type {
            MemoryId::Inp | MemoryId::Wgt => Core::Load,
            // Micro-op and accumulator loads run on the compute core.
            _ => Core::Compute,
        },
        Ok(Insn::Store(_)) => Core::Store,
        // GEMM/ALU/FINISH; undecodable records also land here so the
        // executing callback reports them.
        _ => Core::Compute,
    }
}

/// See the module docs.
#[derive(Debug, Default)]
pub struct TlppVerify {
    queues: [VecDeque<u128>; 3],
    // Dependency tokens in flight between neighboring cores. Tokens
    // survive a drain: a stream may leave credits for the next run.
    load_to_compute: u32,
    compute_to_load: u32,
    compute_to_store: u32,
    store_to_compute: u32,
}

impl TlppVerify {
    /// Enqueue one raw instruction record.
    pub fn push(&mut self, raw: u128) {
        self.queues[core_of(raw) as usize].push_back(raw);
    }

    /// Drain the queues, invoking `run` once per instruction in an order
    /// satisfying the dependency flags. A stream whose flags can never be
    /// satisfied is a fatal dependency deadlock.
    pub fn synchronize(&mut self, mut run: impl FnMut(u128)) {
        loop {
            let mut progress = false;
            for core in [Core::Load, Core::Compute, Core::Store] {
                while let Some(&raw) = self.queues[core as usize].front() {
                    let flags = DepFlags::of_raw(raw);
                    if !self.try_acquire(core, flags) {
                        break;
                    }
                    self.queues[core as usize].pop_front();
                    trace!(?core, ?flags, "run instruction");
                    run(raw);
                    self.release(core, flags);
                    progress = true;
                }
            }
            if self.queues.iter().all(VecDeque::is_empty) {
                break;
            }
            assert!(progress, "instruction stream deadlocks on its dependency flags");
        }
    }

    /// Check the pop flags against the available tokens; consume them and
    /// report success, or leave everything untouched. LOAD has no upstream
    /// producer and STORE no downstream consumer, so those flags have no
    /// queue to wait on and are ignored.
    fn try_acquire(&mut self, core: Core, flags: DepFlags) -> bool {
        let pop_prev = flags.contains(DepFlags::POP_PREV);
        let pop_next = flags.contains(DepFlags::POP_NEXT);
        match core {
            Core::Load => {
                if pop_next && self.compute_to_load == 0 {
                    return false;
                }
                if pop_next {
                    self.compute_to_load -= 1;
                }
            }
            Core::Compute => {
                if (pop_prev && self.load_to_compute == 0)
                    || (pop_next && self.store_to_compute == 0)
                {
                    return false;
                }
                if pop_prev {
                    self.load_to_compute -= 1;
                }
                if pop_next {
                    self.store_to_compute -= 1;
                }
            }
            Core::Store => {
                if pop_prev && self.compute_to_store == 0 {
                    return false;
                }
                if pop_prev {
                    self.compute_to_store -= 1;
                }
            }
        }
        true
    }

    fn release(&mut self, core: Core, flags: DepFlags) {
        let push_prev = flags.contains(DepFlags::PUSH_PREV);
        let push_next = flags.contains(DepFlags::PUSH_NEXT);
        match core {
            Core::Load => {
                if push_next {
                    self.load_to_compute += 1;
                }
            }
            Core::Compute => {
                if push_prev {
                    self.compute_to_load += 1;
                }
                if push_next {
                    self.compute_to_store += 1;
                }
            }
            Core::Store => {
                if push_prev {
                    self.store_to_compute += 1;
                }
            }
        }
    }
}
