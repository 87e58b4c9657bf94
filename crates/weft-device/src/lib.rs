//! Functional model of the Weft tensor accelerator.
//!
//! A [`Device`] owns four on-chip tile memories (input, weight, accumulator,
//! micro-op) and interprets a stream of 128-bit instructions fetched from
//! the process-global simulated DRAM. Instructions are queued through a
//! task-level pipeline verifier that honors the explicit dependency flags
//! carried by each record, then executed by the LOAD/STORE/GEMM/ALU/FINISH
//! handlers. A thread-local [`profiler`] accumulates transfer byte counts
//! and compute op counts, and can put the device into a count-only
//! skip-exec mode.

mod device;
pub mod driver;
pub mod profiler;
mod sram;
mod tlpp;

pub use device::Device;
pub use profiler::DebugFlags;
pub use tlpp::TlppVerify;
