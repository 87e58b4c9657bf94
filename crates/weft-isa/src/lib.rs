//! Instruction-set definitions for the Weft tensor accelerator.
//!
//! The accelerator executes a stream of 128-bit coarse-grained instructions
//! (LOAD, STORE, GEMM, ALU, FINISH) over four on-chip tile memories. This
//! crate holds the build configuration (element widths, lane counts, buffer
//! depths), the instruction and micro-op records with their bit layouts, and
//! the encoders/decoders shared by the device model, the host tooling and the
//! tests. It has no knowledge of the simulated memories themselves.

pub mod config;
mod insn;
mod uop;

pub use insn::{
    AluInsn, AluOp, DecodeError, DepFlags, GemmInsn, Insn, MemInsn, MemoryId, Opcode,
};
pub use uop::Uop;
