mod common;

use common::{load, run_stream, DramBuf};
use weft_device::{profiler, Device};
use weft_isa::config;
use weft_isa::{Insn, MemInsn, MemoryId, Opcode};

/// An ACC_8BIT load reads one DRAM byte per accumulator lane and
/// sign-extends it to 32 bits.
#[test]
fn bytes_are_sign_extended_into_acc_lanes() {
    let values: Vec<i8> = vec![
        -128, -1, 0, 1, 127, -5, 5, -100, 100, 63, -63, 2, -2, 33, -33, 77,
    ];
    let src = DramBuf::with_bytes(&values.iter().map(|&v| v as u8).collect::<Vec<_>>());
    let mut device = Device::new();

    // dram_base counts in (ACC_ELEM_BYTES / 4)-byte rows of packed bytes.
    let rc = run_stream(
        &mut device,
        &[Insn::Load(load(
            MemoryId::Acc8Bit,
            0,
            src.elem_base(config::ACC_ELEM_BYTES / 4),
            1,
        ))
        .encode()],
    );

    assert_eq!(rc, 0);
    let expected: Vec<i32> = values.iter().map(|&v| v as i32).collect();
    assert_eq!(device.acc_lanes(0), expected);
}

/// Rows advance by `(ACC_ELEM_BYTES / 4) * x_stride` DRAM bytes.
#[test]
fn row_stride_is_counted_in_packed_bytes() {
    let mut bytes = vec![0u8; 48];
    bytes[..16].copy_from_slice(&[1; 16]);
    // Bytes 16..32 are a gap skipped by the stride.
    bytes[32..48].copy_from_slice(&[0xfe; 16]); // -2 per lane
    let src = DramBuf::with_bytes(&bytes);
    let mut device = Device::new();

    let op = MemInsn {
        opcode: Opcode::Load,
        memory_type: MemoryId::Acc8Bit,
        dram_base: src.elem_base(config::ACC_ELEM_BYTES / 4),
        y_size: 2,
        x_size: 1,
        x_stride: 2,
        ..MemInsn::default()
    };
    run_stream(&mut device, &[Insn::Load(op).encode()]);

    assert_eq!(device.acc_lanes(0), vec![1; 16]);
    assert_eq!(device.acc_lanes(1), vec![-2; 16]);
}

/// The load counter advances in accumulator element bytes, as for a full
/// 32-bit accumulator load.
#[test]
fn counts_acc_element_bytes() {
    let src = DramBuf::with_bytes(&[0u8; 32]);
    let mut device = Device::new();
    profiler::clear();

    run_stream(
        &mut device,
        &[Insn::Load(load(
            MemoryId::Acc8Bit,
            0,
            src.elem_base(config::ACC_ELEM_BYTES / 4),
            2,
        ))
        .encode()],
    );

    profiler::with(|prof| assert_eq!(prof.acc_load_bytes, 2 * config::ACC_ELEM_BYTES as u64));
}
