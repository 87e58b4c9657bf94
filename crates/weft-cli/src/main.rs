//! `weft` — run a compiled program on the functional simulator.
//!
//! A program directory holds one raw little-endian file per buffer:
//! `input.bin` (i8), `weight.bin` (i8), `accumulator.bin` (i32), `uop.bin`
//! (32-bit micro-ops) and `instructions.bin` (128-bit records), plus an
//! optional `expected_out.bin` (i8) to check the result against. The
//! buffers are staged into simulated DRAM, the instruction stream runs on a
//! device, and the output region is copied back and compared.

use std::path::PathBuf;

use anyhow::{bail, ensure, Context};
use clap::Parser;
use tracing::info;

use weft_device::{driver, profiler, DebugFlags, Device};
use weft_host::{first_mismatch, format_preview, read_elems};
use weft_mem::HostPtr;

#[derive(Parser)]
#[command(name = "weft", about = "Weft tensor-accelerator functional simulator")]
struct Args {
    /// Directory containing the compiled program buffers.
    program: PathBuf,

    /// Count transfers and compute ops without executing them.
    #[arg(long)]
    skip_exec: bool,

    /// Output buffer length in bytes; defaults to expected_out.bin's
    /// length, or one output tile when no expectation is present.
    #[arg(long)]
    out_len: Option<usize>,
}

/// A staged DRAM buffer, freed on drop. Empty host buffers stay unstaged.
struct Staged {
    ptr: Option<HostPtr>,
}

impl Staged {
    fn new(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Staged { ptr: None };
        }
        let ptr = driver::mem_alloc(bytes.len(), true);
        driver::mem_copy_from_host(ptr, bytes);
        Staged { ptr: Some(ptr) }
    }

    fn phy(&self) -> u32 {
        self.ptr.map(driver::mem_phy_addr).unwrap_or(0)
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            driver::mem_free(ptr);
        }
    }
}

fn i8_bytes(values: &[i8]) -> Vec<u8> {
    values.iter().map(|&v| v as u8).collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let dir = &args.program;

    let input: Vec<i8> = read_elems(dir.join("input.bin")).context("loading input buffer")?;
    let weight: Vec<i8> = read_elems(dir.join("weight.bin")).context("loading weight buffer")?;
    let acc: Vec<i32> = read_elems(dir.join("accumulator.bin")).context("loading accumulator buffer")?;
    let uops: Vec<u32> = read_elems(dir.join("uop.bin")).context("loading micro-op buffer")?;
    let insns: Vec<u128> =
        read_elems(dir.join("instructions.bin")).context("loading instruction buffer")?;
    ensure!(!insns.is_empty(), "instruction stream is empty");

    let expected: Option<Vec<i8>> = match read_elems(dir.join("expected_out.bin")) {
        Ok(values) => Some(values),
        Err(weft_host::IoError::Read { .. }) => None,
        Err(err) => return Err(err.into()),
    };
    let out_len = args
        .out_len
        .or_else(|| expected.as_ref().map(Vec::len))
        .unwrap_or(weft_isa::config::OUT_ELEM_BYTES * 256);

    let staged_input = Staged::new(&i8_bytes(&input));
    let staged_weight = Staged::new(&i8_bytes(&weight));
    let staged_acc = Staged::new(&acc.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>());
    let staged_uops = Staged::new(&uops.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>());
    let staged_out = Staged::new(&vec![0u8; out_len.max(1)]);
    let staged_insns =
        Staged::new(&insns.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>());

    info!(
        input = staged_input.phy(),
        weight = staged_weight.phy(),
        accumulator = staged_acc.phy(),
        uop = staged_uops.phy(),
        out = staged_out.phy(),
        instructions = staged_insns.phy(),
        "staged physical addresses"
    );

    profiler::clear();
    profiler::set_debug(if args.skip_exec {
        DebugFlags::SKIP_EXEC
    } else {
        DebugFlags::empty()
    });

    let mut device = Device::new();
    let rc = device.run(staged_insns.phy(), insns.len() as u32, 0);
    if rc != 0 {
        bail!("device run failed with status {rc}");
    }
    info!(finish_count = device.finish_count(), "device run complete");

    let mut out = vec![0u8; out_len];
    if let Some(ptr) = staged_out.ptr {
        driver::mem_copy_to_host(&mut out, ptr);
    }
    let out: Vec<i8> = out.iter().map(|&v| v as i8).collect();

    println!("profiler: {}", profiler::status());
    println!("out = {}", format_preview(&out, 64));

    if let Some(expected) = expected {
        if args.skip_exec {
            info!("skip-exec run, result check skipped");
        } else if let Some((index, actual, want)) = first_mismatch(&out, &expected) {
            println!("expected = {}", format_preview(&expected, 64));
            bail!("output mismatch at element {index}: got {actual}, expected {want}");
        } else {
            println!("output matches expected_out.bin");
        }
    }
    Ok(())
}
