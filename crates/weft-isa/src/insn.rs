//! The 128-bit instruction record and its three layouts.
//!
//! Every record is little-endian with the opcode in the low three bits of
//! byte 0. The opcode selects one of three field layouts: `memory`
//! (LOAD/STORE), `gemm` (GEMM/FINISH) or `alu` (ALU). Fields are packed
//! LSB-first at fixed bit offsets; the unused high bits of the first 64-bit
//! word are zero on encode and ignored on decode.

use bitflags::bitflags;
use thiserror::Error;

// Field widths, fixed for this build.
const OPCODE_BITS: u32 = 3;
const MEMOP_ID_BITS: u32 = 3;
const MEMOP_SRAM_ADDR_BITS: u32 = 16;
const MEMOP_DRAM_ADDR_BITS: u32 = 32;
const MEMOP_SIZE_BITS: u32 = 16;
const MEMOP_STRIDE_BITS: u32 = 16;
const MEMOP_PAD_BITS: u32 = 4;
const UOP_BGN_BITS: u32 = 13;
const UOP_END_BITS: u32 = 14;
const LOOP_ITER_BITS: u32 = 14;
const ACC_IDX_BITS: u32 = 11;
const INP_IDX_BITS: u32 = 11;
const WGT_IDX_BITS: u32 = 10;
const ALU_OPCODE_BITS: u32 = 3;
const ALU_IMM_BITS: u32 = 16;

// Bit offsets shared by all layouts.
const OPCODE_LO: u32 = 0;
const DEP_FLAGS_LO: u32 = 3;

// Memory layout.
const MEM_TYPE_LO: u32 = 7;
const MEM_SRAM_BASE_LO: u32 = MEM_TYPE_LO + MEMOP_ID_BITS;
const MEM_DRAM_BASE_LO: u32 = MEM_SRAM_BASE_LO + MEMOP_SRAM_ADDR_BITS;
const MEM_Y_SIZE_LO: u32 = 64;
const MEM_X_SIZE_LO: u32 = MEM_Y_SIZE_LO + MEMOP_SIZE_BITS;
const MEM_X_STRIDE_LO: u32 = MEM_X_SIZE_LO + MEMOP_SIZE_BITS;
const MEM_Y_PAD_0_LO: u32 = MEM_X_STRIDE_LO + MEMOP_STRIDE_BITS;
const MEM_Y_PAD_1_LO: u32 = MEM_Y_PAD_0_LO + MEMOP_PAD_BITS;
const MEM_X_PAD_0_LO: u32 = MEM_Y_PAD_1_LO + MEMOP_PAD_BITS;
const MEM_X_PAD_1_LO: u32 = MEM_X_PAD_0_LO + MEMOP_PAD_BITS;

// Compute (gemm/alu) layout.
const RESET_LO: u32 = 7;
const UOP_BGN_LO: u32 = 8;
const UOP_END_LO: u32 = UOP_BGN_LO + UOP_BGN_BITS;
const ITER_OUT_LO: u32 = UOP_END_LO + UOP_END_BITS;
const ITER_IN_LO: u32 = ITER_OUT_LO + LOOP_ITER_BITS;
const DST_FACTOR_OUT_LO: u32 = 64;
const DST_FACTOR_IN_LO: u32 = DST_FACTOR_OUT_LO + ACC_IDX_BITS;
const SRC_FACTOR_OUT_LO: u32 = DST_FACTOR_IN_LO + ACC_IDX_BITS;
const SRC_FACTOR_IN_LO: u32 = SRC_FACTOR_OUT_LO + INP_IDX_BITS;
const WGT_FACTOR_OUT_LO: u32 = SRC_FACTOR_IN_LO + INP_IDX_BITS;
const WGT_FACTOR_IN_LO: u32 = WGT_FACTOR_OUT_LO + WGT_IDX_BITS;
const ALU_OPCODE_LO: u32 = SRC_FACTOR_IN_LO + INP_IDX_BITS;
const ALU_USE_IMM_LO: u32 = ALU_OPCODE_LO + ALU_OPCODE_BITS;
const ALU_IMM_LO: u32 = ALU_USE_IMM_LO + 1;

fn field(raw: u128, lo: u32, len: u32) -> u32 {
    debug_assert!(len <= 32 && lo + len <= 128);
    let mask = if len == 32 { u32::MAX as u64 } else { (1u64 << len) - 1 };
    ((raw >> lo) as u64 & mask) as u32
}

fn put(raw: &mut u128, lo: u32, len: u32, value: u32) {
    debug_assert!(len <= 32 && lo + len <= 128);
    let mask = if len == 32 { u32::MAX as u64 } else { (1u64 << len) - 1 };
    debug_assert!(
        (value as u64) <= mask,
        "field value {value:#x} does not fit in {len} bits"
    );
    *raw &= !((mask as u128) << lo);
    *raw |= ((value as u64 & mask) as u128) << lo;
}

/// Decode failure for a raw instruction word.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),
    #[error("unknown memory id {0}")]
    UnknownMemoryId(u32),
    #[error("unknown alu opcode {0}")]
    UnknownAluOp(u32),
}

/// Instruction opcode, low three bits of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Load = 0,
    Store = 1,
    Gemm = 2,
    Finish = 3,
    Alu = 4,
}

impl Opcode {
    pub fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Opcode::Load),
            1 => Ok(Opcode::Store),
            2 => Ok(Opcode::Gemm),
            3 => Ok(Opcode::Finish),
            4 => Ok(Opcode::Alu),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

/// Target memory of a LOAD/STORE instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemoryId {
    Uop = 0,
    Wgt = 1,
    Inp = 2,
    Acc = 3,
    Out = 4,
    /// 8-bit DRAM data sign-extended into the 32-bit accumulator tile.
    Acc8Bit = 5,
}

impl MemoryId {
    pub fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(MemoryId::Uop),
            1 => Ok(MemoryId::Wgt),
            2 => Ok(MemoryId::Inp),
            3 => Ok(MemoryId::Acc),
            4 => Ok(MemoryId::Out),
            5 => Ok(MemoryId::Acc8Bit),
            other => Err(DecodeError::UnknownMemoryId(other)),
        }
    }
}

/// Elementwise ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Max = 1,
    Min = 2,
    Shr = 3,
    Mul = 4,
}

impl AluOp {
    pub fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(AluOp::Add),
            1 => Ok(AluOp::Max),
            2 => Ok(AluOp::Min),
            3 => Ok(AluOp::Shr),
            4 => Ok(AluOp::Mul),
            other => Err(DecodeError::UnknownAluOp(other)),
        }
    }

    /// Apply the operation in 32-bit two's-complement wrapping arithmetic.
    ///
    /// SHR with a negative second operand shifts left by the negated
    /// amount. Shift counts are masked to the low five bits, matching the
    /// 32-bit lane width.
    pub fn apply(self, a: i32, b: i32) -> i32 {
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Max => a.max(b),
            AluOp::Min => a.min(b),
            AluOp::Shr => {
                if b >= 0 {
                    a.wrapping_shr(b as u32)
                } else {
                    a.wrapping_shl(b.unsigned_abs())
                }
            }
            AluOp::Mul => a.wrapping_mul(b),
        }
    }
}

bitflags! {
    /// Pipeline dependency flags carried by every instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DepFlags: u8 {
        const POP_PREV = 1 << 0;
        const POP_NEXT = 1 << 1;
        const PUSH_PREV = 1 << 2;
        const PUSH_NEXT = 1 << 3;
    }
}

impl DepFlags {
    /// Extract the dependency flags of any raw instruction word; the four
    /// bits sit at the same offset in all three layouts.
    pub fn of_raw(raw: u128) -> Self {
        DepFlags::from_bits_truncate(field(raw, DEP_FLAGS_LO, 4) as u8)
    }
}

/// LOAD/STORE: strided 2-D transfer between DRAM and a tile memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInsn {
    pub opcode: Opcode,
    pub flags: DepFlags,
    pub memory_type: MemoryId,
    /// Destination (LOAD) or source (STORE) element index in the tile.
    pub sram_base: u32,
    /// DRAM base in units of tile elements, not bytes.
    pub dram_base: u32,
    pub y_size: u32,
    pub x_size: u32,
    /// DRAM row pitch in elements.
    pub x_stride: u32,
    pub y_pad_0: u32,
    pub y_pad_1: u32,
    pub x_pad_0: u32,
    pub x_pad_1: u32,
}

impl MemInsn {
    pub fn encode(&self) -> u128 {
        let mut raw = 0u128;
        put(&mut raw, OPCODE_LO, OPCODE_BITS, self.opcode as u32);
        put(&mut raw, DEP_FLAGS_LO, 4, self.flags.bits() as u32);
        put(&mut raw, MEM_TYPE_LO, MEMOP_ID_BITS, self.memory_type as u32);
        put(&mut raw, MEM_SRAM_BASE_LO, MEMOP_SRAM_ADDR_BITS, self.sram_base);
        put(&mut raw, MEM_DRAM_BASE_LO, MEMOP_DRAM_ADDR_BITS, self.dram_base);
        put(&mut raw, MEM_Y_SIZE_LO, MEMOP_SIZE_BITS, self.y_size);
        put(&mut raw, MEM_X_SIZE_LO, MEMOP_SIZE_BITS, self.x_size);
        put(&mut raw, MEM_X_STRIDE_LO, MEMOP_STRIDE_BITS, self.x_stride);
        put(&mut raw, MEM_Y_PAD_0_LO, MEMOP_PAD_BITS, self.y_pad_0);
        put(&mut raw, MEM_Y_PAD_1_LO, MEMOP_PAD_BITS, self.y_pad_1);
        put(&mut raw, MEM_X_PAD_0_LO, MEMOP_PAD_BITS, self.x_pad_0);
        put(&mut raw, MEM_X_PAD_1_LO, MEMOP_PAD_BITS, self.x_pad_1);
        raw
    }

    fn decode(raw: u128, opcode: Opcode) -> Result<Self, DecodeError> {
        Ok(MemInsn {
            opcode,
            flags: DepFlags::of_raw(raw),
            memory_type: MemoryId::from_raw(field(raw, MEM_TYPE_LO, MEMOP_ID_BITS))?,
            sram_base: field(raw, MEM_SRAM_BASE_LO, MEMOP_SRAM_ADDR_BITS),
            dram_base: field(raw, MEM_DRAM_BASE_LO, MEMOP_DRAM_ADDR_BITS),
            y_size: field(raw, MEM_Y_SIZE_LO, MEMOP_SIZE_BITS),
            x_size: field(raw, MEM_X_SIZE_LO, MEMOP_SIZE_BITS),
            x_stride: field(raw, MEM_X_STRIDE_LO, MEMOP_STRIDE_BITS),
            y_pad_0: field(raw, MEM_Y_PAD_0_LO, MEMOP_PAD_BITS),
            y_pad_1: field(raw, MEM_Y_PAD_1_LO, MEMOP_PAD_BITS),
            x_pad_0: field(raw, MEM_X_PAD_0_LO, MEMOP_PAD_BITS),
            x_pad_1: field(raw, MEM_X_PAD_1_LO, MEMOP_PAD_BITS),
        })
    }
}

/// GEMM: nested-loop matrix-multiply-accumulate over the micro-op range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GemmInsn {
    pub flags: DepFlags,
    /// Zero the addressed accumulator vectors instead of accumulating.
    pub reset: bool,
    pub uop_bgn: u32,
    pub uop_end: u32,
    pub iter_out: u32,
    pub iter_in: u32,
    pub dst_factor_out: u32,
    pub dst_factor_in: u32,
    pub src_factor_out: u32,
    pub src_factor_in: u32,
    pub wgt_factor_out: u32,
    pub wgt_factor_in: u32,
}

impl GemmInsn {
    pub fn encode(&self) -> u128 {
        let mut raw = 0u128;
        put(&mut raw, OPCODE_LO, OPCODE_BITS, Opcode::Gemm as u32);
        put(&mut raw, DEP_FLAGS_LO, 4, self.flags.bits() as u32);
        put(&mut raw, RESET_LO, 1, self.reset as u32);
        put(&mut raw, UOP_BGN_LO, UOP_BGN_BITS, self.uop_bgn);
        put(&mut raw, UOP_END_LO, UOP_END_BITS, self.uop_end);
        put(&mut raw, ITER_OUT_LO, LOOP_ITER_BITS, self.iter_out);
        put(&mut raw, ITER_IN_LO, LOOP_ITER_BITS, self.iter_in);
        put(&mut raw, DST_FACTOR_OUT_LO, ACC_IDX_BITS, self.dst_factor_out);
        put(&mut raw, DST_FACTOR_IN_LO, ACC_IDX_BITS, self.dst_factor_in);
        put(&mut raw, SRC_FACTOR_OUT_LO, INP_IDX_BITS, self.src_factor_out);
        put(&mut raw, SRC_FACTOR_IN_LO, INP_IDX_BITS, self.src_factor_in);
        put(&mut raw, WGT_FACTOR_OUT_LO, WGT_IDX_BITS, self.wgt_factor_out);
        put(&mut raw, WGT_FACTOR_IN_LO, WGT_IDX_BITS, self.wgt_factor_in);
        raw
    }

    fn decode(raw: u128) -> Self {
        GemmInsn {
            flags: DepFlags::of_raw(raw),
            reset: field(raw, RESET_LO, 1) != 0,
            uop_bgn: field(raw, UOP_BGN_LO, UOP_BGN_BITS),
            uop_end: field(raw, UOP_END_LO, UOP_END_BITS),
            iter_out: field(raw, ITER_OUT_LO, LOOP_ITER_BITS),
            iter_in: field(raw, ITER_IN_LO, LOOP_ITER_BITS),
            dst_factor_out: field(raw, DST_FACTOR_OUT_LO, ACC_IDX_BITS),
            dst_factor_in: field(raw, DST_FACTOR_IN_LO, ACC_IDX_BITS),
            src_factor_out: field(raw, SRC_FACTOR_OUT_LO, INP_IDX_BITS),
            src_factor_in: field(raw, SRC_FACTOR_IN_LO, INP_IDX_BITS),
            wgt_factor_out: field(raw, WGT_FACTOR_OUT_LO, WGT_IDX_BITS),
            wgt_factor_in: field(raw, WGT_FACTOR_IN_LO, WGT_IDX_BITS),
        }
    }
}

/// ALU: elementwise binary op over accumulator vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluInsn {
    pub flags: DepFlags,
    pub uop_bgn: u32,
    pub uop_end: u32,
    pub iter_out: u32,
    pub iter_in: u32,
    pub dst_factor_out: u32,
    pub dst_factor_in: u32,
    pub src_factor_out: u32,
    pub src_factor_in: u32,
    pub op: AluOp,
    pub use_imm: bool,
    /// 16-bit two's-complement immediate, sign-extended on decode.
    pub imm: i32,
}

impl Default for AluInsn {
    fn default() -> Self {
        AluInsn {
            flags: DepFlags::empty(),
            uop_bgn: 0,
            uop_end: 0,
            iter_out: 0,
            iter_in: 0,
            dst_factor_out: 0,
            dst_factor_in: 0,
            src_factor_out: 0,
            src_factor_in: 0,
            op: AluOp::Add,
            use_imm: false,
            imm: 0,
        }
    }
}

impl AluInsn {
    pub fn encode(&self) -> u128 {
        let mut raw = 0u128;
        put(&mut raw, OPCODE_LO, OPCODE_BITS, Opcode::Alu as u32);
        put(&mut raw, DEP_FLAGS_LO, 4, self.flags.bits() as u32);
        put(&mut raw, UOP_BGN_LO, UOP_BGN_BITS, self.uop_bgn);
        put(&mut raw, UOP_END_LO, UOP_END_BITS, self.uop_end);
        put(&mut raw, ITER_OUT_LO, LOOP_ITER_BITS, self.iter_out);
        put(&mut raw, ITER_IN_LO, LOOP_ITER_BITS, self.iter_in);
        put(&mut raw, DST_FACTOR_OUT_LO, ACC_IDX_BITS, self.dst_factor_out);
        put(&mut raw, DST_FACTOR_IN_LO, ACC_IDX_BITS, self.dst_factor_in);
        put(&mut raw, SRC_FACTOR_OUT_LO, INP_IDX_BITS, self.src_factor_out);
        put(&mut raw, SRC_FACTOR_IN_LO, INP_IDX_BITS, self.src_factor_in);
        put(&mut raw, ALU_OPCODE_LO, ALU_OPCODE_BITS, self.op as u32);
        put(&mut raw, ALU_USE_IMM_LO, 1, self.use_imm as u32);
        put(&mut raw, ALU_IMM_LO, ALU_IMM_BITS, (self.imm as i16 as u16) as u32);
        raw
    }

    fn decode(raw: u128) -> Result<Self, DecodeError> {
        Ok(AluInsn {
            flags: DepFlags::of_raw(raw),
            uop_bgn: field(raw, UOP_BGN_LO, UOP_BGN_BITS),
            uop_end: field(raw, UOP_END_LO, UOP_END_BITS),
            iter_out: field(raw, ITER_OUT_LO, LOOP_ITER_BITS),
            iter_in: field(raw, ITER_IN_LO, LOOP_ITER_BITS),
            dst_factor_out: field(raw, DST_FACTOR_OUT_LO, ACC_IDX_BITS),
            dst_factor_in: field(raw, DST_FACTOR_IN_LO, ACC_IDX_BITS),
            src_factor_out: field(raw, SRC_FACTOR_OUT_LO, INP_IDX_BITS),
            src_factor_in: field(raw, SRC_FACTOR_IN_LO, INP_IDX_BITS),
            op: AluOp::from_raw(field(raw, ALU_OPCODE_LO, ALU_OPCODE_BITS))?,
            use_imm: field(raw, ALU_USE_IMM_LO, 1) != 0,
            imm: field(raw, ALU_IMM_LO, ALU_IMM_BITS) as u16 as i16 as i32,
        })
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    Load(MemInsn),
    Store(MemInsn),
    Gemm(GemmInsn),
    Alu(AluInsn),
    /// FINISH uses the gemm layout; only the dependency flags are live.
    Finish(DepFlags),
}

impl Insn {
    pub fn decode(raw: u128) -> Result<Self, DecodeError> {
        match Opcode::from_raw(field(raw, OPCODE_LO, OPCODE_BITS))? {
            Opcode::Load => Ok(Insn::Load(MemInsn::decode(raw, Opcode::Load)?)),
            Opcode::Store => Ok(Insn::Store(MemInsn::decode(raw, Opcode::Store)?)),
            Opcode::Gemm => Ok(Insn::Gemm(GemmInsn::decode(raw))),
            Opcode::Alu => Ok(Insn::Alu(AluInsn::decode(raw)?)),
            Opcode::Finish => Ok(Insn::Finish(DepFlags::of_raw(raw))),
        }
    }

    pub fn encode(&self) -> u128 {
        match self {
            Insn::Load(m) | Insn::Store(m) => m.encode(),
            Insn::Gemm(g) => g.encode(),
            Insn::Alu(a) => a.encode(),
            Insn::Finish(flags) => {
                let mut raw = 0u128;
                put(&mut raw, OPCODE_LO, OPCODE_BITS, Opcode::Finish as u32);
                put(&mut raw, DEP_FLAGS_LO, 4, flags.bits() as u32);
                raw
            }
        }
    }

    /// Encode a FINISH with no dependency flags.
    pub fn finish() -> u128 {
        Insn::Finish(DepFlags::empty()).encode()
    }
}

impl Default for MemInsn {
    fn default() -> Self {
        MemInsn {
            opcode: Opcode::Load,
            flags: DepFlags::empty(),
            memory_type: MemoryId::Inp,
            sram_base: 0,
            dram_base: 0,
            y_size: 0,
            x_size: 0,
            x_stride: 0,
            y_pad_0: 0,
            y_pad_1: 0,
            x_pad_0: 0,
            x_pad_1: 0,
        }
    }
}
