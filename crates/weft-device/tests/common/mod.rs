#![allow(dead_code)]

use weft_device::{driver, Device};
use weft_isa::{GemmInsn, MemInsn, MemoryId, Opcode, Uop};
use weft_mem::HostPtr;

/// A DRAM allocation that frees itself when the test is done.
pub struct DramBuf {
    pub ptr: HostPtr,
    pub phy: u32,
}

impl DramBuf {
    pub fn with_bytes(bytes: &[u8]) -> Self {
        let ptr = driver::mem_alloc(bytes.len().max(1), true);
        driver::mem_copy_from_host(ptr, bytes);
        let phy = driver::mem_phy_addr(ptr);
        DramBuf { ptr, phy }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::with_bytes(&vec![0u8; len])
    }

    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        driver::mem_copy_to_host(&mut out, self.ptr.offset(offset));
        out
    }

    /// This buffer's DRAM base in `elem_bytes`-sized elements, as LOAD and
    /// STORE instructions address memory. Allocation bases are page-aligned
    /// so the division is exact for every tile element size.
    pub fn elem_base(&self, elem_bytes: usize) -> u32 {
        assert_eq!(self.phy as usize % elem_bytes, 0);
        self.phy / elem_bytes as u32
    }
}

impl Drop for DramBuf {
    fn drop(&mut self) {
        driver::mem_free(self.ptr);
    }
}

pub fn i8_bytes(values: &[i8]) -> Vec<u8> {
    values.iter().map(|&v| v as u8).collect()
}

pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn uop_bytes(uops: &[(u32, u32, u32)]) -> Vec<u8> {
    uops.iter()
        .flat_map(|&(dst, src, wgt)| Uop::new(dst, src, wgt).encode().to_le_bytes())
        .collect()
}

pub fn insn_bytes(insns: &[u128]) -> Vec<u8> {
    insns.iter().flat_map(|raw| raw.to_le_bytes()).collect()
}

/// Stage `insns` into DRAM and run them on `device`.
pub fn run_stream(device: &mut Device, insns: &[u128]) -> i32 {
    let stream = DramBuf::with_bytes(&insn_bytes(insns));
    device.run(stream.phy, insns.len() as u32, 0)
}

/// 1-D LOAD with no padding.
pub fn load(memory_type: MemoryId, sram_base: u32, dram_base: u32, x_size: u32) -> MemInsn {
    MemInsn {
        opcode: Opcode::Load,
        memory_type,
        sram_base,
        dram_base,
        y_size: 1,
        x_size,
        x_stride: x_size,
        ..MemInsn::default()
    }
}

/// 1-D STORE of accumulator vectors to the OUT region.
pub fn store(sram_base: u32, dram_base: u32, x_size: u32) -> MemInsn {
    MemInsn {
        opcode: Opcode::Store,
        memory_type: MemoryId::Out,
        sram_base,
        dram_base,
        y_size: 1,
        x_size,
        x_stride: x_size,
        ..MemInsn::default()
    }
}

/// Single-iteration GEMM over the micro-op range `[0, uop_count)`.
pub fn gemm(reset: bool, uop_count: u32) -> GemmInsn {
    GemmInsn {
        reset,
        uop_bgn: 0,
        uop_end: uop_count,
        iter_out: 1,
        iter_in: 1,
        ..GemmInsn::default()
    }
}
