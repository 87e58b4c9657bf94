//! Device facade: instruction fetch, dispatch and the compute engines.

use tracing::debug;

use weft_isa::config;
use weft_isa::{AluInsn, GemmInsn, Insn, MemInsn, MemoryId, Uop};
use weft_mem::PagedDram;

use crate::profiler;
use crate::sram::Sram;
use crate::tlpp::TlppVerify;

type InpSram = Sram<{ config::INP_WIDTH }, { config::INP_LANES }, { config::INP_BUFF_DEPTH }>;
type WgtSram = Sram<{ config::WGT_WIDTH }, { config::WGT_LANES }, { config::WGT_BUFF_DEPTH }>;
type AccSram = Sram<{ config::ACC_WIDTH }, { config::ACC_LANES }, { config::ACC_BUFF_DEPTH }>;
type UopSram = Sram<{ config::UOP_WIDTH }, 1, { config::UOP_BUFF_DEPTH }>;

/// One simulated accelerator.
///
/// Tile memories are private to the device; DRAM and the profiler are the
/// process-global and thread-local instances. A device is single-threaded
/// with respect to its own instruction stream, but distinct devices may run
/// concurrently.
pub struct Device {
    inp: InpSram,
    wgt: WgtSram,
    acc: AccSram,
    uop: UopSram,
    tlpp: TlppVerify,
    finish_counter: u32,
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    pub fn new() -> Self {
        Device {
            inp: InpSram::new(),
            wgt: WgtSram::new(),
            acc: AccSram::new(),
            uop: UopSram::new(),
            tlpp: TlppVerify::default(),
            finish_counter: 0,
        }
    }

    /// Fetch `insn_count` 128-bit records from DRAM at `insn_phy_addr`,
    /// queue them in program order and drain the queue. Returns 0 on
    /// completion; `wait_cycles` is advisory and not enforced.
    pub fn run(&mut self, insn_phy_addr: u32, insn_count: u32, _wait_cycles: u32) -> i32 {
        let dram = PagedDram::global();
        let mut stream = vec![0u8; insn_count as usize * config::INSN_BYTES];
        dram.read(insn_phy_addr as u64, &mut stream);

        self.finish_counter = 0;
        let mut queue = std::mem::take(&mut self.tlpp);
        for record in stream.chunks_exact(config::INSN_BYTES) {
            queue.push(u128::from_le_bytes(record.try_into().unwrap()));
        }
        queue.synchronize(|raw| self.exec(raw));
        self.tlpp = queue;
        0
    }

    /// FINISH instructions retired by the most recent [`Device::run`].
    pub fn finish_count(&self) -> u32 {
        self.finish_counter
    }

    /// Signed lanes of one input tile vector.
    pub fn inp_lanes(&self, elem: u32) -> Vec<i32> {
        (0..config::INP_LANES).map(|lane| self.inp.lane_signed(elem, lane)).collect()
    }

    /// Signed lanes of one weight tile vector.
    pub fn wgt_lanes(&self, elem: u32) -> Vec<i32> {
        (0..config::WGT_LANES).map(|lane| self.wgt.lane_signed(elem, lane)).collect()
    }

    /// Signed lanes of one accumulator tile vector.
    pub fn acc_lanes(&self, elem: u32) -> Vec<i32> {
        (0..config::ACC_LANES).map(|lane| self.acc.lane_signed(elem, lane)).collect()
    }

    /// Decoded micro-op at `index`.
    pub fn uop_at(&self, index: u32) -> Uop {
        Uop::decode(u32::from_le_bytes(self.uop.elem(index).try_into().unwrap()))
    }

    fn exec(&mut self, raw: u128) {
        let insn = Insn::decode(raw).unwrap_or_else(|err| panic!("bad instruction: {err}"));
        debug!(?insn, "dispatch");
        match insn {
            Insn::Load(op) => self.run_load(&op),
            Insn::Store(op) => self.run_store(&op),
            Insn::Gemm(op) => self.run_gemm(&op),
            Insn::Alu(op) => self.run_alu(&op),
            Insn::Finish(_) => self.finish_counter += 1,
        }
    }

    fn run_load(&mut self, op: &MemInsn) {
        if op.x_size == 0 {
            return;
        }
        let dram = PagedDram::global();
        profiler::with(|prof| {
            let skip = prof.skip_exec();
            match op.memory_type {
                MemoryId::Inp => self.inp.load(op, dram, &mut prof.inp_load_bytes, skip),
                MemoryId::Wgt => self.wgt.load(op, dram, &mut prof.wgt_load_bytes, skip),
                MemoryId::Acc => self.acc.load(op, dram, &mut prof.acc_load_bytes, skip),
                // Micro-ops are architectural state that later non-skipped
                // instructions depend on, so they load even in skip-exec.
                MemoryId::Uop => self.uop.load(op, dram, &mut prof.uop_load_bytes, false),
                MemoryId::Acc8Bit => {
                    self.acc.load_int8(op, dram, &mut prof.acc_load_bytes, skip)
                }
                MemoryId::Out => panic!("LOAD cannot target memory id {:?}", op.memory_type),
            }
        });
    }

    fn run_store(&mut self, op: &MemInsn) {
        if op.x_size == 0 {
            return;
        }
        if op.memory_type != MemoryId::Out {
            panic!("STORE supports only the OUT target, got {:?}", op.memory_type);
        }
        let dram = PagedDram::global();
        profiler::with(|prof| {
            prof.out_store_bytes += op.x_size as u64
                * op.y_size as u64
                * (config::BATCH * config::BLOCK_OUT * config::OUT_WIDTH / 8) as u64;
            if !prof.skip_exec() {
                self.acc.trunc_store(op, dram, config::OUT_WIDTH);
            }
        });
    }

    fn run_gemm(&mut self, op: &GemmInsn) {
        if op.reset {
            if profiler::with(|prof| prof.skip_exec()) {
                return;
            }
            self.for_each_uop(op.iter_out, op.iter_in, op.uop_bgn, op.uop_end, |dev, y, x, uop| {
                let dst = uop.dst_idx + y * op.dst_factor_out + x * op.dst_factor_in;
                for lane in 0..config::ACC_LANES {
                    dev.acc.set_lane_signed(dst, lane, 0);
                }
            });
            return;
        }

        profiler::with(|prof| {
            prof.gemm_ops += op.iter_out as u64
                * op.iter_in as u64
                * u64::from(op.uop_end.saturating_sub(op.uop_bgn));
        });
        if profiler::with(|prof| prof.skip_exec()) {
            return;
        }
        self.for_each_uop(op.iter_out, op.iter_in, op.uop_bgn, op.uop_end, |dev, y, x, uop| {
            let dst = uop.dst_idx + y * op.dst_factor_out + x * op.dst_factor_in;
            let src = uop.src_idx + y * op.src_factor_out + x * op.src_factor_in;
            let wgt = uop.wgt_idx + y * op.wgt_factor_out + x * op.wgt_factor_in;
            for i in 0..config::BATCH {
                for j in 0..config::BLOCK_OUT {
                    let lane = i * config::BLOCK_OUT + j;
                    let mut sum = dev.acc.lane_signed(dst, lane);
                    for k in 0..config::BLOCK_IN {
                        let a = dev.inp.lane_signed(src, i * config::BLOCK_IN + k);
                        let w = dev.wgt.lane_signed(wgt, j * config::BLOCK_IN + k);
                        sum = sum.wrapping_add(a.wrapping_mul(w));
                    }
                    dev.acc.set_lane_signed(dst, lane, sum);
                }
            }
        });
    }

    fn run_alu(&mut self, op: &AluInsn) {
        profiler::with(|prof| {
            prof.alu_ops += op.iter_out as u64
                * op.iter_in as u64
                * u64::from(op.uop_end.saturating_sub(op.uop_bgn));
        });
        if profiler::with(|prof| prof.skip_exec()) {
            return;
        }
        self.for_each_uop(op.iter_out, op.iter_in, op.uop_bgn, op.uop_end, |dev, y, x, uop| {
            let dst = uop.dst_idx + y * op.dst_factor_out + x * op.dst_factor_in;
            let src = uop.src_idx + y * op.src_factor_out + x * op.src_factor_in;
            for lane in 0..config::ACC_LANES {
                let a = dev.acc.lane_signed(dst, lane);
                let b = if op.use_imm {
                    op.imm
                } else {
                    dev.acc.lane_signed(src, lane)
                };
                dev.acc.set_lane_signed(dst, lane, op.op.apply(a, b));
            }
        });
    }

    /// Nested-loop controller shared by GEMM and ALU: for every
    /// `(outer, inner, uop)` triple, decode the micro-op and hand it to
    /// `body` together with the loop indices.
    fn for_each_uop(
        &mut self,
        iter_out: u32,
        iter_in: u32,
        uop_bgn: u32,
        uop_end: u32,
        mut body: impl FnMut(&mut Self, u32, u32, Uop),
    ) {
        for y in 0..iter_out {
            for x in 0..iter_in {
                for index in uop_bgn..uop_end {
                    let uop = self.uop_at(index);
                    body(self, y, x, uop);
                }
            }
        }
    }
}
