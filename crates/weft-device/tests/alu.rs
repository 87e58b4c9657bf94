mod common;

use common::{i32_bytes, load, run_stream, uop_bytes, DramBuf};
use weft_device::Device;
use weft_isa::config;
use weft_isa::{AluInsn, AluOp, Insn, MemoryId};

fn alu(op: AluOp, use_imm: bool, imm: i32, uop_count: u32) -> u128 {
    Insn::Alu(AluInsn {
        op,
        use_imm,
        imm,
        uop_bgn: 0,
        uop_end: uop_count,
        iter_out: 1,
        iter_in: 1,
        ..AluInsn::default()
    })
    .encode()
}

/// Stage `values` (padded with zeros) into consecutive accumulator vectors
/// and load the micro-ops, then run `insns`.
fn run_with_acc(device: &mut Device, values: &[i32], uops: &[(u32, u32, u32)], insns: &[u128]) {
    let mut lanes = values.to_vec();
    lanes.resize(lanes.len().next_multiple_of(16), 0);
    let acc = DramBuf::with_bytes(&i32_bytes(&lanes));
    let uop = DramBuf::with_bytes(&uop_bytes(uops));

    let mut stream = vec![
        Insn::Load(load(MemoryId::Uop, 0, uop.elem_base(config::UOP_ELEM_BYTES), uops.len() as u32))
            .encode(),
        Insn::Load(load(
            MemoryId::Acc,
            0,
            acc.elem_base(config::ACC_ELEM_BYTES),
            (lanes.len() / 16) as u32,
        ))
        .encode(),
    ];
    stream.extend_from_slice(insns);
    assert_eq!(run_stream(device, &stream), 0);
}

/// MAX against immediate 0 clamps negatives away.
#[test]
fn max_with_immediate_zero_is_relu() {
    let mut device = Device::new();
    run_with_acc(
        &mut device,
        &[-5, -1, 3, 7],
        &[(0, 0, 0)],
        &[alu(AluOp::Max, true, 0, 1)],
    );
    assert_eq!(&device.acc_lanes(0)[..4], [0, 0, 3, 7]);
    assert_eq!(&device.acc_lanes(0)[4..], [0; 12]);
}

/// SHR with a negative immediate shifts left.
#[test]
fn shr_negative_immediate_shifts_left() {
    let mut device = Device::new();
    run_with_acc(&mut device, &[1], &[(0, 0, 0)], &[alu(AluOp::Shr, true, -3, 1)]);
    assert_eq!(device.acc_lanes(0)[0], 8);
}

/// SHR is arithmetic: the sign bit is replicated.
#[test]
fn shr_is_arithmetic() {
    let mut device = Device::new();
    run_with_acc(
        &mut device,
        &[-64, 64],
        &[(0, 0, 0)],
        &[alu(AluOp::Shr, true, 3, 1)],
    );
    assert_eq!(&device.acc_lanes(0)[..2], [-8, 8]);
}

/// ADD with immediate 0 leaves the accumulator untouched.
#[test]
fn add_immediate_zero_is_a_noop() {
    let values = [i32::MIN, -77, 0, 1, i32::MAX];
    let mut device = Device::new();
    run_with_acc(&mut device, &values, &[(0, 0, 0)], &[alu(AluOp::Add, true, 0, 1)]);
    assert_eq!(&device.acc_lanes(0)[..5], values);
}

/// Vector-vector ops read the second operand from the accumulator tile.
#[test]
fn min_with_vector_operand_reads_acc() {
    let mut values = vec![5i32; 16];
    values[1] = -9;
    let mut src = vec![7i32; 16];
    src[0] = -1;
    values.extend_from_slice(&src);

    let mut device = Device::new();
    // dst = element 0, src = element 1.
    run_with_acc(
        &mut device,
        &values,
        &[(0, 1, 0)],
        &[alu(AluOp::Min, false, 0, 1)],
    );
    assert_eq!(device.acc_lanes(0)[0], -1);
    assert_eq!(device.acc_lanes(0)[1], -9);
    assert_eq!(&device.acc_lanes(0)[2..], [5; 14]);
    // The source vector itself is untouched.
    assert_eq!(device.acc_lanes(1)[0], -1);
    assert_eq!(&device.acc_lanes(1)[1..], [7; 15]);
}

/// MUL wraps in 32-bit two's complement.
#[test]
fn mul_wraps() {
    let mut device = Device::new();
    run_with_acc(
        &mut device,
        &[0x4000_0000, 3],
        &[(0, 0, 0)],
        &[alu(AluOp::Mul, true, 4, 1)],
    );
    assert_eq!(&device.acc_lanes(0)[..2], [0, 12]);
}
