//! Memory model for the Weft functional simulator.
//!
//! Two pieces live here: [`BitPacker`], a bit-accurate view of a byte region
//! as an array of `B`-bit signed/unsigned elements, and [`PagedDram`], the
//! process-global simulated DRAM that hands out stable 32-bit physical
//! addresses backed by host-owned pages.

mod bits;
mod dram;

pub use bits::BitPacker;
pub use dram::{HostPtr, PagedDram, LOG2_PAGE_BYTES, PAGE_BYTES};
